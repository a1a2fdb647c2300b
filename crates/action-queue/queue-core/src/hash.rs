//! Deterministic action identity.
//!
//! The hash covers the action kind and a canonical encoding of its payload,
//! nothing else. Two pushes of the same logical action therefore collapse to
//! the same entry no matter when they were made or what UI metadata they
//! carried.

use alloy_primitives::{B256, keccak256};

use crate::ActionPayload;

/// Variant tags. Part of the hash preimage; never reorder.
const TAG_TRANSACTION: u8 = 0;
const TAG_DEPLOY_ACCOUNT: u8 = 1;
const TAG_UPGRADE: u8 = 2;

/// Computes the identity of an action payload.
///
/// Pure and infallible: field elements that fail canonicalization (possible
/// only on unvalidated payloads) are hashed verbatim, so the function never
/// errors and repeated calls always agree.
pub fn action_hash(payload: &ActionPayload) -> B256 {
    let mut buf = Vec::with_capacity(128);
    match payload {
        ActionPayload::Transaction(tx) => {
            buf.push(TAG_TRANSACTION);
            put_felt(&mut buf, &tx.contract_address);
            put_str(&mut buf, &tx.entrypoint);
            buf.extend_from_slice(&(tx.calldata.len() as u32).to_be_bytes());
            for value in &tx.calldata {
                put_felt(&mut buf, value);
            }
        }
        ActionPayload::DeployAccount(account) => {
            buf.push(TAG_DEPLOY_ACCOUNT);
            put_felt(&mut buf, &account.address);
            put_str(&mut buf, &account.network_id);
            put_felt(&mut buf, &account.class_hash);
            put_felt(&mut buf, &account.salt);
        }
        ActionPayload::Upgrade(upgrade) => {
            buf.push(TAG_UPGRADE);
            put_felt(&mut buf, &upgrade.account_address);
            put_felt(&mut buf, &upgrade.target_implementation);
        }
    }
    keccak256(&buf)
}

/// Canonical form of a field-element string, or `None` if it is neither a
/// hex (`0x…`) nor a decimal literal.
///
/// Hex is lowercased and stripped of leading zeros (`0x0ABC` → `0xabc`),
/// decimal is stripped of leading zeros (`007` → `7`), so spellings of the
/// same value hash identically.
pub fn canonical_felt(value: &str) -> Option<String> {
    if let Some(digits) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let trimmed = digits.trim_start_matches('0');
        let digits = if trimmed.is_empty() { "0" } else { trimmed };
        return Some(format!("0x{}", digits.to_ascii_lowercase()));
    }

    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let trimmed = value.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
}

fn put_felt(buf: &mut Vec<u8>, value: &str) {
    match canonical_felt(value) {
        Some(canonical) => put_str(buf, &canonical),
        None => put_str(buf, value),
    }
}

fn put_str(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
}
