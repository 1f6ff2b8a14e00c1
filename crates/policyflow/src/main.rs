use clap::{Parser, Subcommand};
use policyflow_core::DocumentStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use policyflow::{
    build_router, initialize, open_store, seed_store, AppConfig, AppError, AppResult, TokenIssuer,
};
use policyflow_store::SeedOutcome;

/// PolicyFlow: policy distribution and acknowledgement tracking
#[derive(Parser, Debug)]
#[command(name = "policyflow", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// SQLite database file (overrides the config file)
    #[arg(long, global = true, env = "POLICYFLOW_DB_PATH")]
    database_path: Option<PathBuf>,

    /// Session token secret (overrides the config file)
    #[arg(long, global = true, env = "POLICYFLOW_SESSION_SECRET", hide_env_values = true)]
    session_secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file and create the database
    Init,

    /// Start the HTTP server
    Serve {
        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Apply pending schema migrations
    Migrate,

    /// Seed an empty database with an admin and a sample policy
    Seed {
        #[arg(long)]
        admin_email: Option<String>,

        #[arg(long)]
        admin_name: Option<String>,
    },

    /// Mint a session token for an existing user
    IssueToken {
        #[arg(long)]
        email: String,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("policyflow=debug,policyflow_store=debug,policyflow_access=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("policyflow=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> AppResult<AppConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(AppConfig::default_config_path);
    let mut config = AppConfig::load(&path)?;
    if let Some(db) = &cli.database_path {
        config.database_path = db.clone();
    }
    if let Some(secret) = &cli.session_secret {
        config.auth.session_secret = secret.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Commands::Init => cmd_init(cli.config.as_ref(), config),
        Commands::Serve { bind, port } => cmd_serve(config, bind, port).await,
        Commands::Migrate => cmd_migrate(&config),
        Commands::Seed {
            admin_email,
            admin_name,
        } => cmd_seed(config, admin_email, admin_name),
        Commands::IssueToken { email } => cmd_issue_token(&config, &email),
    }
}

fn cmd_init(config_path: Option<&PathBuf>, config: AppConfig) -> AppResult<()> {
    info!("initializing policyflow");
    open_store(&config)?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(AppConfig::default_config_path);
    config.save(&save_path)?;

    println!("PolicyFlow initialized successfully.");
    println!("  Database: {}", config.database_path.display());
    println!("  Config:   {}", save_path.display());
    if config.uses_insecure_secret() {
        println!("  Warning:  auth.session_secret is the development default; change it.");
    }
    Ok(())
}

async fn cmd_serve(mut config: AppConfig, bind: Option<String>, port: Option<u16>) -> AppResult<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let addr = format!("{}:{}", config.server.bind, config.server.port);

    let state = Arc::new(initialize(config)?);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "policyflow listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn cmd_migrate(config: &AppConfig) -> AppResult<()> {
    let store = open_store(config)?;
    let applied = store.applied_migrations()?;
    println!("Applied migrations ({}):", applied.len());
    for name in applied {
        println!("  {}", name);
    }
    Ok(())
}

fn cmd_seed(
    mut config: AppConfig,
    admin_email: Option<String>,
    admin_name: Option<String>,
) -> AppResult<()> {
    if let Some(email) = admin_email {
        config.bootstrap.admin_email = email;
    }
    if let Some(name) = admin_name {
        config.bootstrap.admin_name = name;
    }

    let store = open_store(&config)?;
    match seed_store(&store, &config)? {
        SeedOutcome::Seeded {
            admin_id,
            staff_id,
            policy_id,
        } => {
            println!("Database seeded.");
            println!("  Admin user:    {}", admin_id);
            println!("  Staff user:    {}", staff_id);
            println!("  Sample policy: {}", policy_id);
        }
        SeedOutcome::AlreadySeeded => println!("Database already has a SuperAdmin; nothing to do."),
    }
    Ok(())
}

fn cmd_issue_token(config: &AppConfig, email: &str) -> AppResult<()> {
    let store = open_store(config)?;
    let user = store.get_user_by_email(email.trim())?;
    let tokens = TokenIssuer::new(&config.auth.session_secret, config.auth.token_ttl_secs);
    let token = tokens.issue(&user).map_err(AppError::Auth)?;
    info!(user_id = %user.id, role = %user.role, "session token issued");
    println!("{}", token);
    Ok(())
}
