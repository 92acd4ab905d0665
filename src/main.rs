use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{Method, header};
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyhold::config::Config;
use keyhold::db::{AppState, DbPool, create_pool, init_db, queries};
use keyhold::error::AppError;
use keyhold::handlers;
use keyhold::handlers::admin::set_license_enabled;
use keyhold::licensing::{resolve_license_including_disabled, run_maintenance};
use keyhold::verify::GumroadClient;

#[derive(Parser, Debug)]
#[command(name = "keyhold")]
#[command(about = "Single-device license activation server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Remove expired cooldowns and stale activations, then exit
    Cleanup,
    /// Inspect or toggle a license
    License {
        #[command(subcommand)]
        action: LicenseCommand,
    },
}

#[derive(Subcommand, Debug)]
enum LicenseCommand {
    /// Print a license with its activations and cooldowns
    Show { key: String },
    /// Disable a license; every activation request is refused until re-enabled
    Disable { key: String },
    /// Re-enable a disabled license
    Enable { key: String },
}

/// Spawns a background task that periodically removes dead cooldowns and
/// stale activations.
fn spawn_cleanup_task(state: AppState, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match state.db.get() {
                Ok(conn) => {
                    if let Err(e) =
                        run_maintenance(&conn, queries::now(), state.stale_activation_days)
                    {
                        tracing::warn!("Background cleanup failed: {}", e);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to get db connection for cleanup: {}", e);
                }
            }
        }
    });

    tracing::info!(
        "Background cleanup task started (runs every {} seconds)",
        interval.as_secs()
    );
}

fn open_database(config: &Config) -> DbPool {
    let pool = create_pool(&config.database_path).unwrap_or_else(|e| {
        eprintln!("Failed to open database {}: {}", config.database_path, e);
        std::process::exit(1);
    });

    let conn = pool.get().unwrap_or_else(|e| {
        eprintln!("Failed to get database connection: {}", e);
        std::process::exit(1);
    });
    if let Err(e) = init_db(&conn) {
        eprintln!("Failed to initialize database: {}", e);
        std::process::exit(1);
    }

    pool
}

fn run_cleanup(config: &Config) {
    let pool = open_database(config);
    let result = pool
        .get()
        .map_err(AppError::from)
        .and_then(|conn| run_maintenance(&conn, queries::now(), config.stale_activation_days));

    match result {
        Ok(report) => {
            println!("Cooldown periods removed: {}", report.cooldown_periods_removed);
            println!("Activations removed:      {}", report.activations_removed);
        }
        Err(e) => {
            eprintln!("Cleanup failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn run_license_command(config: &Config, action: LicenseCommand) {
    let pool = open_database(config);
    let conn = pool.get().unwrap_or_else(|e| {
        eprintln!("Failed to get database connection: {}", e);
        std::process::exit(1);
    });

    let result = match action {
        LicenseCommand::Show { key } => show_license(&conn, &key),
        LicenseCommand::Disable { key } => set_license_enabled(&conn, &key, false).map(|l| {
            println!("License {} disabled", l.id);
        }),
        LicenseCommand::Enable { key } => set_license_enabled(&conn, &key, true).map(|l| {
            println!("License {} enabled", l.id);
        }),
    };

    if let Err(e) = result {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}

fn show_license(conn: &rusqlite::Connection, key: &str) -> keyhold::error::Result<()> {
    let Some((license, via)) = resolve_license_including_disabled(conn, key)? else {
        println!("No license matches {}", key);
        return Ok(());
    };

    println!("License {} (matched by {})", license.id, via.as_ref());
    println!("  external key: {}", license.external_key);
    println!("  local key:    {}", license.local_key.as_deref().unwrap_or("-"));
    println!("  email:        {}", license.email.as_deref().unwrap_or("-"));
    println!("  purchase id:  {}", license.purchase_id.as_deref().unwrap_or("-"));
    println!("  active:       {}", license.active);

    let now = queries::now();
    for a in queries::list_activations_for_license(conn, &license.id)? {
        println!(
            "  activation {} device={} machine={} active={}",
            a.id, a.device_id, a.machine_id, a.active
        );
    }
    for c in queries::list_cooldowns_for_license(conn, &license.id)? {
        println!(
            "  cooldown {} ends_at={} live={}",
            c.id,
            c.ends_at,
            c.is_live(now)
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyhold=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Cleanup => run_cleanup(&config),
        Command::License { action } => run_license_command(&config, action),
    }
}

async fn serve(config: Config) {
    let db_pool = open_database(&config);

    let verifier = GumroadClient::new(config.gumroad_verify_url.clone(), config.upstream_timeout)
        .expect("Failed to build Gumroad client");

    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set; maintenance and admin routes will reject all requests");
    }

    let state = AppState {
        db: db_pool,
        policy: config.activation_policy(),
        verifier: Arc::new(verifier),
        admin_token: config.admin_token.clone(),
        stale_activation_days: config.stale_activation_days,
    };

    spawn_cleanup_task(state.clone(), config.cleanup_interval);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(24 * 60 * 60));

    let app = Router::new()
        .merge(handlers::router(state.clone(), Some(config.rate_limit_rpm)))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!(
        cooldown_hours = config.cooldown_window.as_secs() / 3600,
        "Keyhold server listening on {}",
        addr
    );

    // Connect info is required for IP-based rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
