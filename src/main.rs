use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mailhook_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes,
    services::{
        event_bus::ListenerPool,
        event_service::{EventLogListener, EVENT_LOG_CONSUMER, WEBHOOK_DISPATCH_CONSUMER},
        rate_limit_service::RedisRateLimitStore,
        topic_service::SnsTransport,
    },
    AppState, Stores,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LISTENER_DRAIN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    init_config()?;
    let config = get_config()?;

    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let transport = SnsTransport::new(&config.aws_access_key_id, &config.aws_secret_access_key).await;
    let rate_limits = RedisRateLimitStore::new(&config.redis_url)?;
    let app_state = AppState::new(
        config,
        Stores::postgres(pool),
        Arc::new(transport),
        Box::new(rate_limits),
    )?;

    let mut listeners = ListenerPool::new();
    listeners
        .spawn_group(
            &app_state.bus,
            EVENT_LOG_CONSUMER,
            config.listener_workers,
            Arc::new(EventLogListener),
        )
        .await;
    listeners
        .spawn_group(
            &app_state.bus,
            WEBHOOK_DISPATCH_CONSUMER,
            config.listener_workers,
            Arc::new(app_state.webhook_service.clone()),
        )
        .await;

    let stop = CancellationToken::new();
    let redelivery = {
        let webhooks = app_state.webhook_service.clone();
        let stop = stop.clone();
        let idle = Duration::from_secs(config.webhook_redelivery_interval_secs);
        tokio::spawn(async move {
            loop {
                let pause = match webhooks.redeliver_once().await {
                    Ok(true) => Duration::ZERO,
                    Ok(false) => idle,
                    Err(e) => {
                        error!(error = ?e, "Webhook redelivery error");
                        idle
                    }
                };
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        })
    };

    let app = routes::router(app_state.clone());
    let addr: SocketAddr = config.server_address.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    // The transport confirms subscriptions against this server, so topics are
    // set up only once the listener is bound.
    {
        let topics = app_state.topic_service.clone();
        tokio::spawn(async move {
            if let Err(e) = topics.setup_topics().await {
                error!(error = %e, "Failed to set up notification topics");
            }
        });
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    stop.cancel();
    let _ = redelivery.await;
    listeners.shutdown(&app_state.bus, LISTENER_DRAIN_GRACE).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
