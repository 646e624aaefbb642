/// Storefront Admin Gate
///
/// Two-step passphrase authentication for storefront administrators, and the
/// privileged seller application review it protects.

mod account;
mod admin;
mod api;
mod audit;
mod auth;
mod auth_gate;
mod cli;
mod clock;
mod config;
mod context;
mod db;
mod error;
mod jobs;
mod metrics;
mod server;

use admin::Role;
use cli::Action;
use config::{GateConfig, LoggingConfig};
use context::AppContext;
use error::{GateError, GateResult};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> GateResult<()> {
    let action = cli::handler(&cli::new().get_matches());

    // Load configuration
    let config = GateConfig::from_env()?;

    init_tracing(&config.logging);

    match action {
        Action::Serve => run_server(config).await,
        Action::HashPassphrase => hash_passphrase_from_stdin(),
        Action::GrantRole { user_id, role } => {
            let role = Role::parse(&role)?;
            let ctx = AppContext::new(config).await?;
            if ctx.roles.grant_role(&user_id, role).await? {
                println!("Granted {} to {}", role, user_id);
            } else {
                println!("{} already holds {}", user_id, role);
            }
            print_roles(&ctx, &user_id).await
        }
        Action::RevokeRole { user_id, role } => {
            let role = Role::parse(&role)?;
            let ctx = AppContext::new(config).await?;
            ctx.roles.revoke_role(&user_id, role).await?;
            println!("Revoked {} from {}", role, user_id);
            print_roles(&ctx, &user_id).await
        }
        Action::IssueToken { user_id, ttl_hours } => {
            let ctx = AppContext::new(config).await?;
            let token = ctx
                .tokens
                .issue(&user_id, chrono::Duration::hours(ttl_hours))
                .await?;
            println!("{}", token);
            Ok(())
        }
        Action::RevokeToken { token } => {
            let ctx = AppContext::new(config).await?;
            ctx.tokens.revoke(&token).await?;
            println!("Credential revoked");
            Ok(())
        }
    }
}

async fn print_roles(ctx: &AppContext, user_id: &str) -> GateResult<()> {
    let roles: Vec<String> = ctx
        .roles
        .roles_for(user_id)
        .await?
        .iter()
        .map(Role::to_string)
        .collect();

    if roles.is_empty() {
        println!("{} holds no roles", user_id);
    } else {
        println!("{} holds: {}", user_id, roles.join(", "));
    }
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level)
        .unwrap_or_else(|_| "storefront_admin_gate=info,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run_server(config: GateConfig) -> GateResult<()> {
    print_banner();

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await
}

fn hash_passphrase_from_stdin() -> GateResult<()> {
    let mut passphrase = String::new();
    std::io::stdin().read_line(&mut passphrase)?;
    let passphrase = passphrase.trim_end_matches(['\r', '\n']);

    if passphrase.is_empty() {
        return Err(GateError::Validation("Passphrase cannot be empty".to_string()));
    }

    println!("{}", auth_gate::secrets::hash_passphrase(passphrase)?);
    Ok(())
}

fn print_banner() {
    println!(
        r#"
   ____  _                  __                  _            _       _
  / ___|| |_ ___  _ __ ___ / _|_ __ ___  _ __ | |_     __ _  __| |_ __ (_)_ __
  \___ \| __/ _ \| '__/ _ \ |_| '__/ _ \| '_ \| __|   / _` |/ _` | '_ \| | '_ \
   ___) | || (_) | | |  __/  _| | | (_) | | | | |_   | (_| | (_| | | | | | | | |
  |____/ \__\___/|_|  \___|_| |_|  \___/|_| |_|\__|   \__,_|\__,_|_| |_|_|_| |_|

        Storefront Admin Gate v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
