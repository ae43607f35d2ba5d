//! Process configuration: every option is a flag and an environment variable.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use corelib::NodeId;
use metadata::JsonFileMetadataStore;
use replication::{ConsistencyLevel, FileManager, ManagerConfig};
use streaming::FileStoreService;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::commands::{Command, CommandResult};

pub const DEFAULT_NODES: &str =
    "node-1=/tmp/filestore/node-1,node-2=/tmp/filestore/node-2,node-3=/tmp/filestore/node-3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConsistencyArg {
    One,
    Quorum,
    All,
}

impl From<ConsistencyArg> for ConsistencyLevel {
    fn from(arg: ConsistencyArg) -> Self {
        match arg {
            ConsistencyArg::One => ConsistencyLevel::One,
            ConsistencyArg::Quorum => ConsistencyLevel::Quorum,
            ConsistencyArg::All => ConsistencyLevel::All,
        }
    }
}

/// One storage node as `id=path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub id: NodeId,
    pub path: PathBuf,
}

impl FromStr for NodeSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((id, path)) = s.split_once('=') else {
            bail!("node spec {:?} is not of the form id=path", s);
        };
        let path = path.trim();
        if path.is_empty() {
            bail!("node spec {:?} has an empty path", s);
        }
        let id = NodeId::new(id.trim()).with_context(|| format!("node spec {:?}", s))?;
        Ok(Self {
            id,
            path: PathBuf::from(path),
        })
    }
}

#[derive(Debug, Parser)]
#[command(name = "filestore", version, about = "Replicated, versioned file store")]
pub struct CliConfig {
    /// Directory holding the metadata database
    #[arg(long, env = "FILESTORE_METADATA_DIR", default_value = "/tmp/filestore/metadata")]
    pub metadata_dir: PathBuf,

    /// Metadata database name
    #[arg(long, env = "FILESTORE_DATABASE", default_value = "filestore")]
    pub database: String,

    #[arg(long, env = "FILESTORE_REPLICA_FACTOR", default_value_t = 2)]
    pub replica_factor: usize,

    #[arg(long, env = "FILESTORE_VIRTUAL_NODES", default_value_t = 150)]
    pub virtual_nodes: usize,

    /// Storage nodes as comma-separated id=path pairs
    #[arg(long, env = "FILESTORE_NODES", default_value = DEFAULT_NODES)]
    pub nodes: String,

    #[arg(long, env = "FILESTORE_CONSISTENCY", value_enum, default_value_t = ConsistencyArg::One)]
    pub consistency: ConsistencyArg,

    #[arg(long, env = "FILESTORE_NODE_TIMEOUT_SECS", default_value_t = 30)]
    pub node_timeout_secs: u64,

    /// Per-request deadline; must exceed 2 x replica factor x node timeout.
    /// Derived from those when omitted.
    #[arg(long, env = "FILESTORE_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// Entry point of the binary: set up logging, run the command on a fresh
    /// runtime and print its result as JSON.
    pub fn run(self) -> anyhow::Result<()> {
        self.init_logging();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let result = runtime.block_on(self.execute())?;

        println!("{}", serde_json::to_string_pretty(&result)?);
        if !result.is_success() {
            bail!("command failed");
        }
        Ok(())
    }

    /// Bootstrap the store and run the configured command.
    pub async fn execute(self) -> anyhow::Result<CommandResult> {
        let service = self.bootstrap().await?;
        let result = self.command.execute(&service).await;
        service.manager().metadata().close().await?;
        result
    }

    pub fn node_specs(&self) -> anyhow::Result<Vec<NodeSpec>> {
        self.nodes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(NodeSpec::from_str)
            .collect()
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            replica_factor: self.replica_factor,
            virtual_nodes: self.virtual_nodes,
            consistency: self.consistency.into(),
            node_timeout: Duration::from_secs(self.node_timeout_secs),
        }
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.metadata_dir.join(format!("{}.json", self.database))
    }

    async fn bootstrap(&self) -> anyhow::Result<FileStoreService> {
        let specs = self.node_specs()?;
        let store = JsonFileMetadataStore::open(self.metadata_path())
            .await
            .with_context(|| format!("failed to open metadata at {}", self.metadata_path().display()))?;

        let manager = FileManager::new(Arc::new(store), self.manager_config());
        for spec in specs {
            manager
                .register_node(spec.id.clone(), &spec.path)
                .await
                .with_context(|| format!("failed to register node {}", spec.id))?;
            info!(node = %spec.id, path = ?spec.path, "registered storage node");
        }

        let service = FileStoreService::new(Arc::new(manager));
        let service = match self.request_timeout_secs {
            Some(secs) => service
                .with_request_timeout(Duration::from_secs(secs))
                .context("invalid --request-timeout-secs")?,
            None => service,
        };
        info!(request_timeout = ?service.request_timeout(), "request deadline set");
        Ok(service)
    }

    fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        // Logs go to stderr so stdout carries only the JSON result
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CliConfig::try_parse_from(["filestore", "health"]).unwrap();

        assert_eq!(config.metadata_path(), PathBuf::from("/tmp/filestore/metadata/filestore.json"));
        let manager = config.manager_config();
        assert_eq!(manager, ManagerConfig::default());
        assert_eq!(config.request_timeout_secs, None);

        let specs = config.node_specs().unwrap();
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].id, NodeId::from("node-1"));
        assert_eq!(specs[2].path, PathBuf::from("/tmp/filestore/node-3"));
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = CliConfig::try_parse_from([
            "filestore",
            "--replica-factor",
            "3",
            "--consistency",
            "quorum",
            "--database",
            "files",
            "--metadata-dir",
            "/data/meta",
            "--nodes",
            "a=/data/a, b=/data/b",
            "list",
            "--page",
            "2",
        ])
        .unwrap();

        assert_eq!(config.replica_factor, 3);
        assert_eq!(config.manager_config().consistency, ConsistencyLevel::Quorum);
        assert_eq!(config.metadata_path(), PathBuf::from("/data/meta/files.json"));
        let ids: Vec<NodeId> = config.node_specs().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![NodeId::from("a"), NodeId::from("b")]);
        assert!(matches!(config.command, Command::List { page: 2, page_size: 10 }));
    }

    #[test]
    fn test_bad_node_specs() {
        assert!("node-1".parse::<NodeSpec>().is_err());
        assert!("=/tmp/x".parse::<NodeSpec>().is_err());
        assert!("node-1=".parse::<NodeSpec>().is_err());
        assert_eq!(
            "node-1=/tmp/x".parse::<NodeSpec>().unwrap(),
            NodeSpec {
                id: NodeId::from("node-1"),
                path: PathBuf::from("/tmp/x"),
            }
        );
    }

    #[test]
    fn test_unknown_consistency_rejected() {
        assert!(CliConfig::try_parse_from(["filestore", "--consistency", "most", "health"]).is_err());
    }
}
