use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::{signal, sync::mpsc};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

use careflow_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.logging);

    let db_pool = api::db::connect(&cfg.database).await?;
    if cfg.database.auto_migrate {
        api::db::run_migrations(&db_pool).await?;
    }

    let db_arc = Arc::new(db_pool);
    let (event_tx, event_rx) = mpsc::channel(cfg.dispatch.event_channel_capacity);
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));
    tokio::spawn(api::events::process_events(event_rx));

    let (notifications, notification_rx) =
        api::notifications::NotificationQueue::channel(cfg.dispatch.notification_queue_capacity);
    let notifier: Arc<dyn api::notifications::Notifier> =
        Arc::new(api::notifications::LogNotifier);
    let dispatcher = tokio::spawn(api::notifications::run_dispatcher(
        notification_rx,
        notifier,
        cfg.dispatch.retry_policy(),
    ));

    let services = api::handlers::AppServices::new(
        db_arc.clone(),
        event_sender.clone(),
        notifications,
    );

    let app_state = api::AppState {
        db: db_arc,
        config: cfg.clone(),
        event_sender,
        services,
    };

    let app = Router::<api::AppState>::new()
        .route("/", get(|| async { "careflow-api up" }))
        .nest("/api/v1", api::api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(cfg.server.request_timeout()))
        .with_state(app_state);

    let addr = cfg.server.socket_addr()?;
    info!(%addr, environment = %cfg.server.environment, "careflow-api listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned every queue sender, so the dispatcher stops once the backlog is delivered.
    api::notifications::drain_dispatcher(dispatcher, cfg.dispatch.shutdown_drain()).await;

    info!("careflow-api shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
