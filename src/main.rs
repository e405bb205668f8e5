use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use hydrotrack::auth::{self, SecretHasher, validate_password};
use hydrotrack::config::{LogFormat, LoggingConfig, ServerConfig};
use hydrotrack::server::{AppState, create_router};
use hydrotrack::store::{MemoryStore, SqliteStore, Store, demo};
use hydrotrack::types::Owner;

const DEFAULT_OWNER_NAME: &str = "owner";

#[derive(Parser)]
#[command(name = "hydrotrack")]
#[command(about = "A dashboard service for hydroponic growing tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// TOML config file. Flags below override its values.
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Serve seeded sample tables from memory instead of the database
        #[arg(long)]
        demo: bool,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the database and create the owner password
    Init {
        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Owner name
        #[arg(long, default_value = DEFAULT_OWNER_NAME)]
        name: String,

        /// Owner password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },

    /// Change an owner's password and sign out all of their sessions
    SetPassword {
        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Owner name (may be omitted when there is a single owner)
        #[arg(long)]
        name: Option<String>,

        /// New password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))?;

    match logging.format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    Ok(())
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

fn resolve_password(password: Option<String>, non_interactive: bool) -> anyhow::Result<String> {
    let password = match password {
        Some(password) => password,
        None if non_interactive => bail!("--password is required with --non-interactive"),
        None => inquire::Password::new("Password:")
            .with_validator(|input: &str| match validate_password(input) {
                Ok(()) => Ok(inquire::validator::Validation::Valid),
                Err(message) => Err(message.into()),
            })
            .prompt()?,
    };

    if let Err(message) = validate_password(&password) {
        bail!(message);
    }

    Ok(password)
}

fn open_store(data_dir: &Path) -> anyhow::Result<SqliteStore> {
    let db_path = data_dir.join("hydrotrack.db");
    if !db_path.exists() {
        bail!("Server not initialized. Run 'hydrotrack admin init' first to create the database.");
    }
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;
    Ok(store)
}

fn run_init(
    data_dir: &Path,
    name: &str,
    password: Option<String>,
    non_interactive: bool,
) -> anyhow::Result<()> {
    if name.trim().is_empty() {
        bail!("Owner name cannot be empty");
    }

    fs::create_dir_all(data_dir)?;

    let db_path = data_dir.join("hydrotrack.db");
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    #[cfg(unix)]
    set_restrictive_permissions(&db_path);

    if store.has_owner()? {
        bail!(
            "Server already initialized. Database exists at: {}",
            db_path.display()
        );
    }

    let password = resolve_password(password, non_interactive)?;
    let hasher = SecretHasher::new();
    let owner = Owner {
        id: Uuid::new_v4().to_string(),
        name: name.trim().to_string(),
        password_hash: hasher.hash(&password)?,
        created_at: Utc::now(),
    };
    store.create_owner(&owner)?;

    println!();
    println!("========================================");
    println!("Created owner '{}'", owner.name);
    println!();
    println!("Database: {}", db_path.display());
    println!("Start the server with: hydrotrack serve --data-dir {}", data_dir.display());
    println!("========================================");
    println!();

    Ok(())
}

fn run_set_password(
    data_dir: &Path,
    name: Option<String>,
    password: Option<String>,
    non_interactive: bool,
) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;

    let owner = match name {
        Some(name) => match store.get_owner_by_name(&name)? {
            Some(owner) => owner,
            None => bail!("Owner '{name}' not found"),
        },
        None => {
            let mut owners = store.list_owners()?;
            match owners.len() {
                0 => bail!("No owner exists. Run 'hydrotrack admin init' first."),
                1 => owners.remove(0),
                _ => bail!("Multiple owners exist. Pass --name to choose one."),
            }
        }
    };

    let password = resolve_password(password, non_interactive)?;
    let revoked = auth::set_password(&store, &SecretHasher::new(), &owner.id, &password)?;

    println!(
        "Password updated for '{}'. Signed out {revoked} session(s).",
        owner.name
    );

    Ok(())
}

fn demo_store(config: &ServerConfig) -> anyhow::Result<MemoryStore> {
    let store = MemoryStore::new();
    let now = Utc::now();
    let owner = demo::demo_owner(SecretHasher::new().hash(&config.demo_password)?, now);
    store.create_owner(&owner)?;
    demo::seed(&store, &owner.id, now)?;
    Ok(store)
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = if config.demo_mode {
        warn!("Demo mode: serving sample data from memory, nothing will be saved");
        Arc::new(demo_store(&config)?)
    } else {
        let store = open_store(&config.data_dir)?;
        if !store.has_owner()? {
            bail!("Server not initialized. Run 'hydrotrack admin init' first to create the owner.");
        }
        info!("Using database at {}", config.db_path().display());
        Arc::new(store)
    };

    let state = Arc::new(AppState::new(
        store,
        Arc::new(mockable::DefaultClock),
        &config,
    ));

    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {e}");
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => {
            init_tracing(&LoggingConfig::default())?;
            match command {
                AdminCommands::Init {
                    data_dir,
                    name,
                    password,
                    non_interactive,
                } => run_init(&data_dir, &name, password, non_interactive)?,
                AdminCommands::SetPassword {
                    data_dir,
                    name,
                    password,
                    non_interactive,
                } => run_set_password(&data_dir, name, password, non_interactive)?,
            }
        }
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
            demo,
        } => {
            let mut config = match config {
                Some(path) => ServerConfig::load(&path)?,
                None => ServerConfig::default(),
            };
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            config.demo_mode |= demo;
            config.validate()?;

            init_tracing(&config.logging)?;
            run_serve(config).await?;
        }
    }

    Ok(())
}
