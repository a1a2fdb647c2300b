//! Shared types for the wallet action queue: the action model exchanged
//! between UI clients and the queue daemon, and the deterministic action
//! identity derived from it.

pub mod hash;

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

pub use hash::action_hash;

/// Identity of a queued action, derived from kind + canonicalized payload.
pub type ActionHash = B256;

/// An invoke of an entrypoint on a deployed contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    pub contract_address: String,
    pub entrypoint: String,
    /// Ordered field-element strings, hex (`0x…`) or decimal.
    pub calldata: Vec<String>,
}

/// Deployment of a precomputed account address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountDescriptor {
    pub address: String,
    pub network_id: String,
    pub class_hash: String,
    pub salt: String,
}

/// Class-hash replacement for an already deployed account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpgradePayload {
    pub account_address: String,
    pub target_implementation: String,
}

/// The unit of work awaiting on-chain submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionPayload {
    Transaction(TransactionPayload),
    DeployAccount(AccountDescriptor),
    Upgrade(UpgradePayload),
}

impl ActionPayload {
    /// The account address this action is keyed on. Submission order must be
    /// preserved per account since account nonces are sequential.
    pub fn account_address(&self) -> &str {
        match self {
            Self::Transaction(tx) => &tx.contract_address,
            Self::DeployAccount(account) => &account.address,
            Self::Upgrade(upgrade) => &upgrade.account_address,
        }
    }

    /// Rejects payloads with missing or malformed required fields.
    /// A payload that passes here hashes infallibly.
    pub fn validate(&self) -> Result<(), InvalidAction> {
        match self {
            Self::Transaction(tx) => {
                require_felt("contractAddress", &tx.contract_address)?;
                if tx.entrypoint.is_empty() {
                    return Err(InvalidAction::MissingField("entrypoint"));
                }
                for value in &tx.calldata {
                    require_felt("calldata", value)?;
                }
            }
            Self::DeployAccount(account) => {
                require_felt("address", &account.address)?;
                require_felt("classHash", &account.class_hash)?;
                require_felt("salt", &account.salt)?;
                if account.network_id.is_empty() {
                    return Err(InvalidAction::MissingField("networkId"));
                }
            }
            Self::Upgrade(upgrade) => {
                require_felt("accountAddress", &upgrade.account_address)?;
                require_felt("targetImplementation", &upgrade.target_implementation)?;
            }
        }
        Ok(())
    }
}

fn require_felt(field: &'static str, value: &str) -> Result<(), InvalidAction> {
    if value.is_empty() {
        return Err(InvalidAction::MissingField(field));
    }
    if hash::canonical_felt(value).is_none() {
        return Err(InvalidAction::MalformedFieldElement {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Descriptive fields for the UI. Opaque to the queue, excluded from the
/// action hash, passed through to the transaction record on success.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Where an action is in its lifecycle. `Submitting` entries found at startup
/// are orphans from an interrupted process and are reset to `Pending`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Pending,
    Submitting,
    Failed { reason: String },
}

/// A persisted queue entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    pub hash: ActionHash,
    /// Monotonic insertion counter; drives FIFO fairness across actions.
    pub seq: u64,
    pub payload: ActionPayload,
    pub meta: ActionMeta,
    pub status: ActionStatus,
    /// Unix seconds at append time. Never part of the hash.
    pub created_at: u64,
}

/// The push DTO submitted by UI clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRequest {
    pub payload: ActionPayload,
    #[serde(default)]
    pub meta: ActionMeta,
}

/// Rejected at push time; nothing is persisted.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidAction {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("malformed field element in {field}: {value:?}")]
    MalformedFieldElement { field: &'static str, value: String },
}
