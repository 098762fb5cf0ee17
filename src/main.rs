use anyhow::Result;
use tokio::net::TcpListener;

use wireset_realtime::cluster::RelaySubscriber;
use wireset_realtime::config::Settings;
use wireset_realtime::server::{create_app, AppState};
use wireset_realtime::shutdown::{wait_for_signal, GracefulShutdown};
use wireset_realtime::tasks::HeartbeatTask;
use wireset_realtime::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    let _telemetry = init_telemetry(&settings.logging, &settings.otel)?;
    tracing::info!(
        server_id = %settings.cluster.server_id,
        cluster_enabled = settings.cluster.enabled,
        auth_mode = ?settings.auth.mode,
        "Configuration loaded"
    );

    let state = AppState::new(settings.clone())?;
    tracing::info!("Application state initialized");

    // Relay subscriber only runs in cluster mode
    let relay_handle = state.redis_pool.clone().map(|pool| {
        let subscriber = RelaySubscriber::new(
            settings.cluster.clone(),
            pool,
            state.relay.clone(),
            state.shutdown.subscribe(),
        );
        tokio::spawn(subscriber.run())
    });

    let heartbeat_task = HeartbeatTask::new(
        settings.websocket.clone(),
        state.rooms.clone(),
        state.directory.clone(),
        state.shutdown.subscribe(),
    );
    let heartbeat_handle = tokio::spawn(heartbeat_task.run());

    let graceful = GracefulShutdown::new(state.rooms.clone(), state.shutdown.clone());

    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(ws_path = %settings.server.ws_path, "Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = wait_for_signal().await;
            graceful.execute(reason).await;
        })
        .await?;

    tracing::info!("Waiting for background tasks to finish...");
    if let Some(handle) = relay_handle {
        let _ = handle.await;
    }
    let _ = heartbeat_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
