use clap::{Parser, Subcommand};

use tessera_crypto::address::format_address;
use tessera_crypto::keys::Keypair;

use crate::config::NodeConfig;
use crate::error::NodeError;

#[derive(Parser)]
#[command(
    name = "tessera",
    about = "Tessera ledger node: weighted bid/vote proof-of-stake",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the node
    Run {
        /// Path to config file
        #[arg(short, long, default_value = "tessera.toml")]
        config: String,
        /// Override the P2P listen address (e.g. "0.0.0.0:1000")
        #[arg(long)]
        listen: Option<String>,
        /// Storage backend: "sqlite" or "memory"
        #[arg(long)]
        storage: Option<String>,
        /// Override data directory path
        #[arg(long)]
        data_dir: Option<String>,
        /// Boot node `ip:port` to connect to (can be specified multiple times)
        #[arg(long = "boot-node")]
        boot_nodes: Vec<String>,
        /// Hex-encoded 32-byte validator key
        #[arg(long)]
        keypair_seed: Option<String>,
    },
    /// Initialize a new node configuration
    Init {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        dir: String,
    },
    /// Print the genesis block for the configured validator set
    Genesis {
        /// Path to config file; the built-in validator set is used if absent
        #[arg(short, long)]
        config: Option<String>,
        /// Also write the JSON to this path
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Generate a new validator key
    Keygen,
}

/// Load `path`, then apply command-line overrides.
fn load_run_config(
    path: &str,
    listen: Option<String>,
    storage: Option<String>,
    data_dir: Option<String>,
    boot_nodes: Vec<String>,
    keypair_seed: Option<String>,
) -> Result<NodeConfig, NodeError> {
    let mut config = NodeConfig::load(path)?;
    if let Some(addr) = listen {
        config.network.listen_addr = addr;
    }
    if let Some(db) = storage {
        config.storage.db_type = db;
    }
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir;
    }
    config.network.boot_nodes.extend(boot_nodes);
    if let Some(seed) = keypair_seed {
        config.validator.keypair_seed = Some(seed);
    }
    Ok(config)
}

/// Log filter for this invocation: the config's level for `run`, else "info".
pub fn log_level(cli: &Cli) -> String {
    match &cli.command {
        Command::Run { config, .. } => NodeConfig::load(config)
            .map(|c| c.logging.level)
            .unwrap_or_else(|_| "info".to_string()),
        _ => "info".to_string(),
    }
}

pub async fn run(cli: Cli) -> Result<(), NodeError> {
    match cli.command {
        Command::Run {
            config,
            listen,
            storage,
            data_dir,
            boot_nodes,
            keypair_seed,
        } => {
            let config = load_run_config(&config, listen, storage, data_dir, boot_nodes, keypair_seed)?;
            let node = crate::node::Node::new(config).await?;
            node.run().await
        }
        Command::Init { dir } => {
            NodeConfig::init(&dir)?;
            tracing::info!("Node configuration initialized in {}", dir);
            Ok(())
        }
        Command::Genesis { config, output } => {
            let genesis = match config {
                Some(path) => NodeConfig::load(&path)?.genesis,
                None => crate::config::GenesisConfig::default(),
            };
            let json = crate::genesis::generate_genesis(&genesis, output.as_deref())?;
            println!("{}", json);
            Ok(())
        }
        Command::Keygen => {
            let keypair = Keypair::generate();
            println!("Secret key: {}", hex::encode(keypair.seed()));
            println!("Address: {}", format_address(&keypair.address()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::parse_from([
            "tessera",
            "run",
            "--listen",
            "127.0.0.1:2000",
            "--boot-node",
            "10.0.0.1:1000",
            "--boot-node",
            "10.0.0.2:1000",
        ]);
        match cli.command {
            Command::Run {
                config,
                listen,
                boot_nodes,
                ..
            } => {
                assert_eq!(config, "tessera.toml");
                assert_eq!(listen.as_deref(), Some("127.0.0.1:2000"));
                assert_eq!(boot_nodes.len(), 2);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_overrides_apply_on_top_of_file() {
        let tmp = tempfile::tempdir().unwrap();
        NodeConfig::init(tmp.path().to_str().unwrap()).unwrap();
        let path = tmp.path().join(crate::config::CONFIG_FILE_NAME);
        let config = load_run_config(
            path.to_str().unwrap(),
            None,
            Some("memory".to_string()),
            None,
            vec!["10.0.0.1:1000".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(config.storage.db_type, "memory");
        assert_eq!(config.network.boot_nodes, vec!["10.0.0.1:1000".to_string()]);
        assert_eq!(config.network.listen_addr, "0.0.0.0:1000");
    }
}
