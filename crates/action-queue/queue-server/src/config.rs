use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;

use crate::{
    executor::RpcExecutor,
    server::QueueServer,
    store::ActionStore,
    transactions::TransactionLog,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Path of the database, defaults to the user data directory
    #[arg(long, env = "QUEUE_DB_PATH")]
    pub db_path: Option<PathBuf>,
    /// Cache size in bytes
    #[arg(long, env = "QUEUE_CACHE_SIZE", default_value = "1000000")]
    pub cache_size: usize,
    /// Api server address
    #[arg(long, env = "QUEUE_LISTEN_ADDR", default_value = "127.0.0.1:5040")]
    pub listen_addr: SocketAddr,
    /// JSON-RPC endpoint of the wallet signing node
    #[arg(long, env = "QUEUE_NODE_URL")]
    pub node_url: String,
    /// Log level
    #[arg(long, env = "QUEUE_LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,
    /// Seconds before an in-flight submission is failed as timed out
    #[arg(long, env = "QUEUE_SUBMIT_TIMEOUT_SECS", default_value = "150")]
    pub submit_timeout_secs: u64,
    /// Seconds between prune passes over stale failed entries
    #[arg(long, env = "QUEUE_PRUNE_INTERVAL_SECS", default_value = "60")]
    pub prune_interval_secs: u64,
    /// Seconds a failed entry is kept before eviction
    #[arg(long, env = "QUEUE_FAILED_RETENTION_SECS", default_value = "86400")]
    pub failed_retention_secs: u64,
}

impl Config {
    /// Build the action queue server
    pub async fn build(self) -> anyhow::Result<QueueServer<RpcExecutor>> {
        // Bind to an address
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!(listen_addr = ?self.listen_addr, "Listening on address");

        // Get the database path
        let db_path = match &self.db_path {
            Some(db_path) => db_path.clone(),
            None => {
                let root_dir = directories::ProjectDirs::from("com", "openvault", "action-queue")
                    .context("could not determine a data directory")?;
                root_dir.data_dir().join("db")
            }
        };

        // Try to open the sled db
        let db = sled::Config::new()
            .path(db_path.clone())
            .cache_capacity_bytes(self.cache_size)
            .open()?;

        let db_size = db.size_on_disk()?;
        tracing::info!(
            database_size_bytes = db_size,
            database_path = %db_path.display(),
            "Opened database"
        );

        let store = ActionStore::new(&db)?;
        let sink = TransactionLog::new(&db)?;

        let executor = Arc::new(RpcExecutor::new(&self.node_url)?);
        tracing::info!(node_url = %self.node_url, "Connected executor to signing node");

        let server = QueueServer {
            listener,
            store,
            executor,
            sink,
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
            prune_interval: Duration::from_secs(self.prune_interval_secs),
            failed_retention: Duration::from_secs(self.failed_retention_secs),
        };

        Ok(server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_server_random_port() -> anyhow::Result<()> {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let addr = SocketAddr::from_str("127.0.0.1:0").unwrap();

        let config = Config {
            db_path: Some(temp_dir.path().join("db")),
            cache_size: 1024 * 1024,
            listen_addr: addr,
            node_url: "http://127.0.0.1:9".to_string(),
            log_level: LevelFilter::current(),
            submit_timeout_secs: 150,
            prune_interval_secs: 60,
            failed_retention_secs: 86400,
        };

        let server = config.build().await?;

        let listen_addr = server.listener.local_addr()?;
        // Check that we got a random port
        assert_ne!(listen_addr.port(), 0);

        let cancel_token = CancellationToken::new();
        let cancel_token_clone = cancel_token.clone();

        let task_handle = tokio::task::spawn(async move {
            server.run(cancel_token_clone).await.unwrap();
        });

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let response = reqwest::get(format!("http://{listen_addr}/health")).await?;
        assert_eq!(response.status(), 200);

        cancel_token.cancel();
        task_handle.await.unwrap();
        Ok(())
    }

    #[test]
    fn test_config_defaults() {
        // Test with required arguments and check defaults for the rest
        let config = Config::try_parse_from(vec![
            "program",
            "--node-url",
            "http://127.0.0.1:5050",
        ])
        .unwrap();

        // Check default values
        assert_eq!(config.cache_size, 1000000);
        assert_eq!(config.listen_addr, "127.0.0.1:5040".parse().unwrap());
        assert_eq!(config.log_level, LevelFilter::INFO);
        assert_eq!(config.submit_timeout_secs, 150);
        assert_eq!(config.prune_interval_secs, 60);
        assert_eq!(config.failed_retention_secs, 86400);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn test_config_args() {
        let config = Config::try_parse_from(vec![
            "program",
            "--node-url",
            "http://127.0.0.1:5050",
            "--cache-size",
            "2000000",
            "--listen-addr",
            "127.0.0.1:8080",
            "--log-level",
            "debug",
            "--db-path",
            "/tmp/test-db",
            "--submit-timeout-secs",
            "30",
        ])
        .unwrap();

        assert_eq!(config.cache_size, 2000000);
        assert_eq!(config.listen_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.log_level, LevelFilter::DEBUG);
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/test-db")));
        assert_eq!(config.submit_timeout_secs, 30);
    }

    #[test]
    fn test_node_url_is_required() {
        assert!(Config::try_parse_from(vec!["program"]).is_err());
    }
}
