use std::sync::Arc;
use std::time::Duration;

use roadwatch_detection::capability::PlateReader;
use roadwatch_detection::ffmpeg_source::FfmpegSourceOpener;
use roadwatch_detection::http_backend::{HttpDetector, HttpPlateReader, InferenceClient};
use roadwatch_detection::{DetectionEngine, EngineConfig};
use roadwatch_events::{
    EventBus, EventPersistence, NotificationGateway, Notifier, WebhookDelivery,
};
use roadwatch_worker::handlers::thumbnail::UrlTemplateStorage;
use roadwatch_worker::{maintenance, JobDispatcher, JobHandlers, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long in-flight jobs get to finish after a shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::from_env();
    let engine_config = EngineConfig::from_env();

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = roadwatch_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    roadwatch_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    roadwatch_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Events ---
    let event_bus = Arc::new(EventBus::default());
    let persistence_handle = tokio::spawn(EventPersistence::run(pool.clone(), event_bus.subscribe()));
    let gateway_handle = config.webhook_url.clone().map(|url| {
        let delivery = WebhookDelivery::new().expect("Failed to build webhook client");
        tokio::spawn(NotificationGateway::new(delivery, url).run(event_bus.subscribe()))
    });
    let notifier = Notifier::new(Arc::clone(&event_bus));

    // --- Detection engine (one capability handle per process) ---
    let inference = InferenceClient::new(config.inference_url.clone())
        .expect("Failed to build inference client");
    let engine = Arc::new(DetectionEngine::new(
        Arc::new(FfmpegSourceOpener),
        Arc::new(HttpDetector::new(inference.clone())),
        Some(Arc::new(HttpPlateReader::new(
            inference,
            engine_config.plate_confidence_scale,
        )) as Arc<dyn PlateReader>),
        engine_config,
    ));
    tracing::info!(inference_url = %config.inference_url, "Detection engine configured");

    let handlers = Arc::new(JobHandlers::new(
        engine,
        Arc::new(UrlTemplateStorage::new(config.thumbnail_base_url.clone())),
        config.analysis_timeout,
    ));

    // --- Background tasks ---
    let cancel = CancellationToken::new();
    let worker_id = format!("worker-{}", instance_suffix());

    let dispatcher = JobDispatcher::new(pool.clone(), handlers, notifier, worker_id, &config);
    let dispatcher_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.run(cancel).await })
    };
    let sweep_handle = tokio::spawn(maintenance::run_retry_sweep(
        pool.clone(),
        config.clone(),
        cancel.clone(),
    ));
    let cleanup_handle = tokio::spawn(maintenance::run_cleanup(
        pool.clone(),
        config.job_retention,
        config.cleanup_interval,
        cancel.clone(),
    ));

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, draining in-flight jobs");
    cancel.cancel();

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, dispatcher_handle).await.is_err() {
        tracing::warn!("In-flight jobs did not finish in time; the retry sweep will reap them");
    }
    let _ = sweep_handle.await;
    let _ = cleanup_handle.await;

    // Dropping the last bus handle closes the channel and ends the consumers.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence_handle).await;
    if let Some(handle) = gateway_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    pool.close().await;
    tracing::info!("Worker shut down");
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "roadwatch_worker=debug,roadwatch_detection=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn instance_suffix() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string());
    format!("{host}-{}", std::process::id())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
