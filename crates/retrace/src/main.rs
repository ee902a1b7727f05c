use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use retrace_core::Config;

mod worker;

#[derive(Parser)]
#[command(
    name = "retrace",
    about = "Retrace - request snapshot, replay, and background worker service",
    version
)]
struct Cli {
    #[arg(short, long, value_name = "FILE", help = "Configuration file path")]
    config: Option<String>,

    #[arg(short, long, help = "Enable verbose logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the HTTP API process
    Serve {
        #[arg(long, help = "Bind address override")]
        host: Option<String>,

        #[arg(short, long, help = "Bind port override")]
        port: Option<u16>,
    },

    /// Start the background worker process
    Worker {
        #[arg(short, long, help = "Introspection port override")]
        port: Option<u16>,
    },

    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        command: MigrateCommand,
    },

    /// Check system health
    Health,

    /// Show configuration
    Config {
        #[arg(short, long, help = "Show full configuration")]
        show: bool,

        #[arg(long, help = "Validate configuration")]
        validate: bool,
    },
}

#[derive(clap::Subcommand)]
enum MigrateCommand {
    /// Run pending migrations
    Run,

    /// Show migration status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration (file + env overrides)
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    init_tracing(&config, cli.verbose);

    info!("Starting retrace v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            retrace_api::run(config).await?;
        }

        Some(Commands::Worker { port }) => {
            let mut config = config;
            if let Some(port) = port {
                config.worker.port = port;
            }
            worker::run(config).await?;
        }

        Some(Commands::Migrate { command }) => {
            run_migrations(config, command).await?;
        }

        Some(Commands::Health) => {
            run_health_check(config).await?;
        }

        Some(Commands::Config { show, validate }) => {
            run_config_command(config, show, validate)?;
        }

        None => {
            info!("No command specified, starting API server...");
            retrace_api::run(config).await?;
        }
    }

    Ok(())
}

fn init_tracing(config: &Config, verbose: bool) {
    let directive = if verbose {
        "retrace=debug,tower_http=debug,sqlx=warn".to_string()
    } else {
        config.logging.env_filter()
    };

    tracing_subscriber::fmt()
        .with_env_filter(directive)
        .with_target(false)
        .init();
}

async fn run_migrations(config: Config, command: MigrateCommand) -> Result<()> {
    use retrace_core::Migrator;

    let pool = retrace_core::create_pool(&config.database).await?;
    let migrator = Migrator::new(pool);

    match command {
        MigrateCommand::Run => {
            migrator.migrate().await?;
            info!("Migrations completed successfully");
        }
        MigrateCommand::Status => {
            let applied = migrator.status().await?;
            for migration in &applied {
                println!(
                    "{:>4}  {}  applied {}",
                    migration.version, migration.name, migration.applied_at
                );
            }
            if applied.is_empty() {
                println!("No migrations applied");
            }
        }
    }

    Ok(())
}

async fn run_health_check(config: Config) -> Result<()> {
    use std::time::Duration;

    let pool = retrace_core::create_pool(&config.database).await?;
    let db = retrace_core::Database::new(pool);
    let healthy = db
        .probe(Duration::from_secs(config.database.probe_timeout_secs))
        .await
        .is_ok();

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "database": if healthy { "healthy" } else { "unhealthy" },
        }))?
    );

    if !healthy {
        error!("System health check failed");
        std::process::exit(1);
    }

    info!("System is healthy");
    Ok(())
}

fn run_config_command(config: Config, show: bool, validate: bool) -> Result<()> {
    if validate {
        config.validate()?;
        info!("Configuration is valid");
    }

    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }

    Ok(())
}
