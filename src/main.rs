//! Fixture Mock Server - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use fixture_mock_server::{server, MockServerConfig};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "fixture-mock-server",
    about = "File-backed mock API server - JSON fixtures with templating, latency simulation, and hot reload",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MOCK_CONFIG", default_value = "mock-server.yaml")]
    config: PathBuf,

    /// Port to listen on (overrides the configured listen port)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Fixture root directory
    #[arg(short = 'd', long, env = "RESPONSES_DIR")]
    fixtures_dir: Option<PathBuf>,

    /// Request field carrying the lookup value
    #[arg(long, env = "LOOKUP_FIELD")]
    lookup_field: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, env = "LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Disable hot reload of fixtures
    #[arg(long)]
    no_watch: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

impl Args {
    /// Apply command line overrides on top of the file configuration.
    fn apply(&self, config: &mut MockServerConfig) {
        if let Some(port) = self.port {
            config.server.listen.set_port(port);
        }
        if let Some(dir) = &self.fixtures_dir {
            config.fixtures.root = dir.clone();
        }
        if let Some(field) = &self.lookup_field {
            config.fixtures.lookup_field = field.clone();
        }
        if self.no_watch {
            config.watch.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockServerConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration");
        MockServerConfig::default()
    };
    args.apply(&mut config);
    config.validate()?;

    if args.print_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    // Validate and exit if requested
    if args.validate {
        println!(
            "Configuration is valid (fixtures at {}, lookup field {:?})",
            config.fixtures.root.display(),
            config.fixtures.lookup_field
        );
        return Ok(());
    }

    server::run(config).await
}
