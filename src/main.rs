use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

use palisade::authz::web::{self, AppState};
use palisade::authz::{builtin, loader, validation, Policy, PolicyStore, PredicateRegistry};
use palisade::errors::PalisadeError;
use palisade::settings::Settings;

#[derive(Parser, Debug)]
#[command(
    name = "palisade",
    version,
    about = "Role-based, inheritance-aware authorization engine"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "PALISADE_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the authorization check API (default)
    Serve,
    /// Load and validate the configured policy, then exit
    Validate,
    /// Print the role table
    Roles,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    let registry = PredicateRegistry::new();
    let policy = load_policy(&settings, &registry)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings, policy, registry).await?,
        Command::Validate => {
            println!(
                "policy OK: {} roles, {} presets",
                policy.role_count(),
                policy.preset_count()
            );
        }
        Command::Roles => print_roles(&policy),
    }
    Ok(())
}

fn load_policy(settings: &Settings, registry: &PredicateRegistry) -> Result<Policy, PalisadeError> {
    match &settings.authz.policies_dir {
        Some(dir) => Ok(loader::load_policies(dir, registry)?),
        None => {
            let policy = builtin::policy();
            validation::validate_policy(&policy)?;
            tracing::info!(
                roles = policy.role_count(),
                presets = policy.preset_count(),
                "Using built-in authorization policy"
            );
            Ok(policy)
        }
    }
}

async fn serve(
    settings: Settings,
    policy: Policy,
    registry: PredicateRegistry,
) -> Result<(), PalisadeError> {
    let state = AppState {
        store: Arc::new(PolicyStore::new(policy)),
        policies_dir: settings.authz.policies_dir.clone(),
        registry: Arc::new(registry),
    };
    let router = web::router(state);

    let addr = settings.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Authorization API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Authorization API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

fn print_roles(policy: &Policy) {
    let mut roles: Vec<_> = policy.roles().collect();
    roles.sort_by(|a, b| a.name.cmp(&b.name));

    println!("{:<16} {:<20} {:<24} KINDS", "ROLE", "DISPLAY", "PARENTS");
    for role in roles {
        let mut kinds: Vec<&str> = role.permissions.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        println!(
            "{:<16} {:<20} {:<24} {}",
            role.name,
            role.display_name,
            role.parents.join(", "),
            kinds.join(", ")
        );
    }
}
