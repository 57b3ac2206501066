use meetsfu_api::reminders::WsReminderNotifier;
use meetsfu_api::{build_router, state::AppState};
use meetsfu_config::Settings;
use meetsfu_db::{connect, indexes::ensure_indexes};
use meetsfu_services::dao::base::BaseDao;
use meetsfu_services::scheduler::reminder::ReminderScheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
        "meetsfu_api=debug,meetsfu_services=debug,meetsfu_db=debug,tower_http=debug".into()
    });
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load()?;
    info!("starting meetsfu-api on {}:{}", settings.app.host, settings.app.port);

    let db = connect(&settings).await?;
    ensure_indexes(&db).await?;

    // Spawns the mediasoup worker pool.
    let app_state = AppState::new(db.clone(), settings.clone()).await?;

    let reminder_scheduler = Arc::new(ReminderScheduler::new(
        BaseDao::new(&db, meetsfu_db::models::reminder::Reminder::COLLECTION),
        BaseDao::new(&db, meetsfu_db::models::meeting::Meeting::COLLECTION),
        BaseDao::new(&db, meetsfu_db::models::participant::Participant::COLLECTION),
        BaseDao::new(&db, meetsfu_db::models::user::User::COLLECTION),
        app_state.email.clone(),
        Arc::new(WsReminderNotifier::new(app_state.ws_storage.clone(), app_state.users.clone())),
    ));

    let cron_scheduler = JobScheduler::new().await?;
    cron_scheduler
        .add(Job::new_repeated_async(Duration::from_secs(60), move |_uuid, _lock| {
            let scheduler = reminder_scheduler.clone();
            Box::pin(async move { scheduler.run_tick().await })
        })?)
        .await?;
    cron_scheduler.start().await?;

    let app = build_router(app_state);

    let addr = format!("{}:{}", settings.app.host, settings.app.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cron_scheduler.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
