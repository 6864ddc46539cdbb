use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ideahub::config::{self, Config, StoreBackend};
use ideahub::notification::pipeline::EventPipeline;
use ideahub::notification::push::{FcmGateway, PushDispatcher, PushGateway, PushMessage};
use ideahub::notification::realtime::{self, ConnectionRegistry, RealtimeFanout};
use ideahub::store::memory::MemoryStore;
use ideahub::store::postgres::PgStore;
use ideahub::store::{NotificationStore, ProfileStore};
use ideahub::{api, cli, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // OTLP export is opt-in via OTEL_EXPORTER_OTLP_ENDPOINT; stdout logging is always on.
    use opentelemetry::KeyValue;

    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "ideahub"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ideahub=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Notification { command }) => {
            let pipeline = build_pipeline(&cfg, false).await?;
            handle_notification_command(command, &pipeline).await
        }
        Some(cli::Commands::Push { command }) => {
            let pipeline = build_pipeline(&cfg, false).await?;
            handle_push_command(command, &pipeline).await
        }
        Some(cli::Commands::Purge { days }) => {
            let pipeline = build_pipeline(&cfg, false).await?;
            let purged = jobs::retention::purge_once(pipeline.store().as_ref(), days).await?;
            println!("Purged {} read notification(s) older than {} day(s).", purged, days);
            Ok(())
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

// ── Wiring ────────────────────────────────────────────────────

async fn build_stores(
    cfg: &Config,
    migrate: bool,
) -> anyhow::Result<(Arc<dyn NotificationStore>, Arc<dyn ProfileStore>)> {
    match cfg.store {
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database...");
            let db = PgStore::connect(&cfg.database_url).await?;
            if migrate {
                tracing::info!("Running migrations...");
                db.migrate().await?;
            }
            Ok((Arc::new(db.clone()), Arc::new(db)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, notifications are lost on restart");
            let store = MemoryStore::new();
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
    }
}

/// Build the event pipeline from config. `serving` also runs migrations
/// and subscribes to the realtime bus.
async fn build_pipeline(cfg: &Config, serving: bool) -> anyhow::Result<EventPipeline> {
    let (notifications, profiles) = build_stores(cfg, serving).await?;

    let gateway: Option<Arc<dyn PushGateway>> = match cfg.fcm() {
        Some((endpoint, token)) => {
            let gw = FcmGateway::new(endpoint.to_string(), token.to_string(), cfg.push_timeout())?;
            tracing::info!("Push delivery enabled (FCM)");
            Some(Arc::new(gw))
        }
        None => {
            tracing::info!("Push delivery disabled (no FCM credentials)");
            None
        }
    };

    let registry = Arc::new(ConnectionRegistry::new());
    let fanout = match cfg.redis_url.as_deref() {
        Some(url) => {
            tracing::info!("Connecting to Redis...");
            let client = redis::Client::open(url)?;
            let conn = redis::aio::ConnectionManager::new(client.clone()).await?;
            let listening = Arc::new(AtomicBool::new(false));
            if serving {
                realtime::spawn_redis_listener(client, registry.clone(), listening.clone());
            }
            RealtimeFanout::with_redis(registry, conn, listening)
        }
        None => RealtimeFanout::local(registry),
    };

    Ok(EventPipeline::new(
        notifications,
        PushDispatcher::new(profiles, gateway),
        fanout,
    ))
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    let pipeline = build_pipeline(&cfg, true).await?;

    if let Some(days) = cfg.read_retention_days {
        jobs::retention::spawn(pipeline.store().clone(), days);
        tracing::info!("Retention job started (read notifications older than {}d, every 1h)", days);
    }

    let cors_origin = HeaderValue::from_str(&cfg.cors_origin)
        .with_context(|| format!("invalid IDEAHUB_CORS_ORIGIN: {}", cfg.cors_origin))?;

    let state = Arc::new(AppState::new(pipeline, cfg));

    let app = api::router(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer({
            use axum::http::{HeaderName, Method};
            CorsLayer::new()
                .allow_origin(cors_origin)
                .allow_methods([
                    Method::GET, Method::POST, Method::PUT,
                    Method::PATCH, Method::OPTIONS,
                ])
                .allow_headers([
                    HeaderName::from_static("content-type"),
                    HeaderName::from_static("authorization"),
                    HeaderName::from_static("x-service-key"),
                    HeaderName::from_static("x-request-id"),
                ])
                .allow_credentials(true)
        })
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("ideahub listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Middleware: injects a unique X-Request-Id into every response.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: injects security headers into every response.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    // Notification payloads are per-user
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");

    resp
}

// ── CLI commands ──────────────────────────────────────────────

async fn handle_notification_command(
    cmd: cli::NotificationCommands,
    pipeline: &EventPipeline,
) -> anyhow::Result<()> {
    match cmd {
        cli::NotificationCommands::List { user_id } => {
            let records = pipeline.list_unread(&user_id).await?;
            if records.is_empty() {
                println!("No unread notifications.");
            } else {
                println!("{:<38} {:<15} {:<20} TITLE", "ID", "CATEGORY", "CREATED");
                for r in records {
                    println!(
                        "{:<38} {:<15} {:<20} {}",
                        r.id,
                        r.category,
                        r.created_at.format("%Y-%m-%d %H:%M"),
                        r.title
                    );
                }
            }
        }
        cli::NotificationCommands::MarkRead { id } => {
            let id = uuid::Uuid::parse_str(&id).context("Invalid notification ID")?;
            let record = pipeline.mark_read(id).await?;
            println!("Notification {} marked as {}.", record.id, record.status.as_str());
        }
        cli::NotificationCommands::ReadAll { user_id } => {
            let updated = pipeline.mark_all_read(&user_id).await?;
            println!("Marked {} notification(s) as read for {}.", updated, user_id);
        }
    }
    Ok(())
}

async fn handle_push_command(
    cmd: cli::PushCommands,
    pipeline: &EventPipeline,
) -> anyhow::Result<()> {
    match cmd {
        cli::PushCommands::SetToken { user_id, token } => {
            pipeline.set_token(&user_id, &token).await?;
            println!("Push token stored for {}.", user_id);
        }
        cli::PushCommands::CheckToken { user_id } => {
            let has = pipeline.has_token(&user_id).await?;
            println!("tokenStatus: {}", has);
        }
        cli::PushCommands::Test { token, title, body } => {
            pipeline
                .send_direct_push(&token, &PushMessage::new(title, body))
                .await?;
            println!("Notification sent successfully.");
        }
    }
    Ok(())
}
