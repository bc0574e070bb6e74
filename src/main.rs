use axum::Router;
use chrono::Utc;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tollgate::config::Config;
use tollgate::db::{AppState, create_pool, init_audit_db, init_db, queries};
use tollgate::handlers;
use tollgate::models::{AuditAction, CreateLicence, Tier};
use tollgate::util::AuditLogBuilder;

#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(about = "Licence validation and quota enforcement for usage-bound API licences")]
struct Cli {
    /// Seed the database with a demo licence (dev mode only)
    #[arg(long)]
    seed: bool,

    /// Delete databases on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds one enterprise licence for local testing.
/// Only runs in dev mode and when the database is empty.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");
    let audit_conn = state.audit.get().expect("Failed to get audit db connection");

    let count = queries::count_licences(&conn).expect("Failed to count licences");
    if count > 0 {
        tracing::info!("Database already has licences, skipping seed");
        return;
    }

    let key = format!("dev-{}", uuid::Uuid::new_v4().simple());
    let input = CreateLicence {
        key: key.clone(),
        identifier: "dev-app".to_string(),
        tier: Tier::Enterprise,
        request_limit: 1000,
        valid_until: Utc::now().timestamp() + 365 * 86400,
        max_ips: None,
        hwid: vec![],
    };
    let licence = queries::create_licence(&conn, &state.key_hasher, &input, state.default_max_ips)
        .expect("Failed to create dev licence");

    AuditLogBuilder::system(&audit_conn, state.audit_log_enabled)
        .action(AuditAction::SeedLicence)
        .resource("licence", &licence.value.id)
        .save()
        .expect("Failed to create audit log");

    tracing::info!("============================================");
    tracing::info!("DEV LICENCE SEEDED");
    tracing::info!("============================================");

    // Copy-paste friendly output, the key is not stored and cannot be shown again
    println!();
    println!("--- COPY FROM HERE ---");
    println!("  licence_id: {}", licence.value.id);
    println!("  licence_key: {}", key);
    println!("  identifier: {}", licence.value.identifier);
    println!("  request_limit: {}", licence.value.request_limit);
    println!("--- END COPY ---");
    println!();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tollgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    });

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    // Create database connection pools
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    let audit_pool =
        create_pool(&config.audit_database_path).expect("Failed to create audit database pool");

    // Initialize database schemas
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }
    {
        let conn = audit_pool.get().expect("Failed to get audit connection");
        init_audit_db(&conn).expect("Failed to initialize audit database");
    }

    let state = AppState::from_config(db_pool, audit_pool, &config);
    tracing::info!(
        max_attempts = state.engine.max_attempts(),
        admin_tokens = config.admin_tokens.len(),
        trust_proxy_headers = config.trust_proxy_headers,
        "Licence engine ready"
    );

    // Purge old audit logs on startup (0 = never purge)
    if config.audit_log_retention_days > 0 {
        let conn = state.audit.get().expect("Failed to get audit connection for purge");
        match queries::purge_old_audit_logs(&conn, config.audit_log_retention_days) {
            Ok(count) if count > 0 => {
                tracing::info!(
                    "Purged {} audit log entries older than {} days",
                    count,
                    config.audit_log_retention_days
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to purge old audit logs: {}", e);
            }
        }
    }

    // Seed dev data if --seed flag is passed (only in dev mode)
    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set TOLLGATE_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = Router::new()
        // Public endpoints (no auth, rate limited)
        .merge(handlers::public::router(config.rate_limit))
        // Admin API (bearer token auth)
        .merge(handlers::admin::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    let audit_path = config.audit_database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: databases will be deleted on exit");
    }

    tracing::info!("Tollgate server listening on {}", addr);

    // Peer addresses feed both rate limiting and the caller IP of /validate
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral databases...");
        for path in [&db_path, &audit_path] {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove {}: {}", path, e);
            } else {
                tracing::info!("Removed {}", path);
            }
            let _ = std::fs::remove_file(format!("{}-wal", path));
            let _ = std::fs::remove_file(format!("{}-shm", path));
        }
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
