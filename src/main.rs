//! Request Gateway
//!
//! HTTP gateway enforcing origin policy, rate limits, payload bounds,
//! security headers and caller identity in front of the API routes.

use anyhow::Result;
use clap::Parser;
use request_gateway::{
    config::{Environment, Settings},
    server::App,
    services::AdminTokenService,
};
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Lifetime of the admin token printed at startup
const EPHEMERAL_ADMIN_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Request Gateway
///
/// Middleware pipeline in front of the API: CORS, rate limiting, payload
/// size guard, security headers and identity resolution.
#[derive(Parser, Debug)]
#[command(name = "request-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on (overrides PORT env var)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides HOST env var)
    #[arg(long)]
    host: Option<String>,

    /// Log level: trace, debug, info, warn, error (overrides LOG_LEVEL env var)
    #[arg(long)]
    log_level: Option<String>,

    /// Environment: dev, staging, prod (overrides ENVIRONMENT env var)
    #[arg(short, long)]
    env: Option<Environment>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (before logging, so we can use log_level)
    let mut settings = Settings::load()?;

    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(log_level) = args.log_level {
        settings.log_level = log_level;
    }
    if let Some(env) = args.env {
        settings.environment = env;
    }

    let ephemeral_admin = settings.generate_ephemeral_admin_secret();

    // CLI overrides may change what is valid (e.g. --env prod)
    settings.validate()?;

    init_tracing(&settings.log_level, settings.environment);

    if ephemeral_admin {
        let token = AdminTokenService::new(&settings.admin_token)?.issue("ephemeral-admin", EPHEMERAL_ADMIN_TOKEN_TTL)?;

        println!("\n{}", "=".repeat(60));
        println!("  Ephemeral admin token (valid for one hour, this process only):");
        println!("  {}", token);
        println!("{}\n", "=".repeat(60));
        println!("  Usage:");
        println!(
            "    curl -H \"Authorization: Bearer {}\" http://{}:{}/admin/whoami\n",
            token, settings.host, settings.port
        );
        println!("{}\n", "=".repeat(60));
    }

    tracing::info!(
        app_name = %settings.app_name,
        version = %settings.app_version,
        environment = %settings.environment,
        host = %settings.host,
        port = %settings.port,
        "Starting application"
    );

    let app = App::new(settings).await?;

    app.run_with_graceful_shutdown().await?;

    tracing::info!("Application shutdown complete");

    Ok(())
}

/// Initialize tracing: `RUST_LOG` wins over the configured level; JSON lines
/// outside development, human-readable output in development.
fn init_tracing(log_level: &str, environment: Environment) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = match environment {
        Environment::Development => fmt::layer().pretty().with_filter(filter).boxed(),
        Environment::Staging | Environment::Production => fmt::layer().json().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry().with(console_layer).init();
}
