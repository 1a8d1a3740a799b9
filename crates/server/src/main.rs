//! Entry point: binds the webhook receiver and starts the summary/notify
//! worker pools, mirroring the sidecar's multi-task-spawn-plus-select!
//! shutdown shape.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::serve;
use prhub_broker::CredentialBroker;
use prhub_chat::ChatNotifier;
use prhub_core::config::Config;
use prhub_core::job::{QUEUE_PR_NOTIFY_CHAT, QUEUE_PR_SUMMARY};
use prhub_queue::{JobQueue, RedisQueue};
use prhub_store::{MongoStore, Storage};
use prhub_webhook::{build_router, AppState};
use prhub_worker::{run_worker_pool, HttpGenerativeModel, JobProcessor, NotificationWorker, SummaryWorker};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("Starting PR hub server...");

    if let Err(e) = config.validate() {
        error!(error = %e, "configuration invalid, refusing to start");
        return Err(anyhow::anyhow!(e));
    }

    let store: Arc<dyn Storage> = Arc::new(
        MongoStore::connect(&config.store.mongodb_uri)
            .await
            .context("failed to connect to MongoDB")?,
    );

    let queue: Arc<dyn JobQueue> = Arc::new(
        RedisQueue::new(
            &config.queue.redis_host,
            config.queue.redis_port,
            config.queue.redis_password.as_deref(),
        )
        .context("failed to construct Redis queue client")?,
    );

    let broker = Arc::new(
        CredentialBroker::from_config(&config.platform).context("failed to construct credential broker")?,
    );

    let model = Arc::new(HttpGenerativeModel::from_config(&config.model));
    let chat = Arc::new(ChatNotifier::from_config(&config.chat));

    let webhook_state = AppState {
        store: store.clone(),
        queue: queue.clone(),
        broker: broker.clone(),
        webhook_secret: config.platform.webhook_secret.clone(),
    };
    let app = build_router(webhook_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "webhook receiver listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server_shutdown = shutdown_rx.clone();
    let mut server_handle = tokio::spawn(async move {
        let mut rx = server_shutdown;
        let result = serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.changed().await;
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "HTTP server error");
        }
    });

    let summary_worker: Arc<dyn JobProcessor> = Arc::new(SummaryWorker {
        store: store.clone(),
        queue: queue.clone(),
        broker: broker.clone(),
        model,
        chat: config.chat.clone(),
        frontend_base_url: config.frontend_base_url.clone(),
    });
    let notification_worker: Arc<dyn JobProcessor> = Arc::new(NotificationWorker {
        store: store.clone(),
        chat,
    });

    let concurrency = config.queue.worker_concurrency;
    info!(concurrency, "starting worker pools");

    let summary_handle = tokio::spawn(run_worker_pool(
        queue.clone(),
        summary_worker,
        QUEUE_PR_SUMMARY,
        concurrency,
        shutdown_rx.clone(),
    ));
    let notify_handle = tokio::spawn(run_worker_pool(
        queue.clone(),
        notification_worker,
        QUEUE_PR_NOTIFY_CHAT,
        concurrency,
        shutdown_rx,
    ));

    let server_already_exited = tokio::select! {
        () = async { tokio::signal::ctrl_c().await.ok(); } => {
            info!("received shutdown signal");
            false
        }
        result = &mut server_handle => {
            if let Err(e) = result {
                warn!(error = %e, "HTTP server task panicked");
            }
            warn!("HTTP server task exited unexpectedly");
            true
        }
    };

    let _ = shutdown_tx.send(true);
    if !server_already_exited {
        let _ = server_handle.await;
    }
    let _ = summary_handle.await;
    let _ = notify_handle.await;

    info!("PR hub server shutdown complete");
    Ok(())
}
