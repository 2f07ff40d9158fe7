use std::{net::SocketAddr, sync::Arc, time::Duration};

use jellywave::{
    audio::{ProbeMethod, Prober},
    catalog::{Catalog, JellyfinClient},
    common::{logger, types::AnyResult},
    configs::Config,
    player::{FfmpegStreamer, RoomRegistry},
    rest,
    server::{AppState, spawn_event_logger},
    voice::RtpConnector,
};
use tracing::info;

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;
    logger::init(&config);

    info!("jellywave {} starting", env!("CARGO_PKG_VERSION"));

    let catalog: Arc<dyn Catalog> = Arc::new(JellyfinClient::new(&config.jellyfin)?);

    let prober = Prober::new(
        ProbeMethod::from(config.player.probe_method),
        config.player.executable.clone(),
        Duration::from_secs(config.player.probe_timeout_secs),
    );
    let streamer = Arc::new(FfmpegStreamer::new(
        catalog.clone(),
        prober,
        config.player.clone(),
    ));
    let connector = Arc::new(RtpConnector::new(config.voice.clone()));
    let registry = RoomRegistry::new(connector, streamer, config.player.packet_buffer);

    spawn_event_logger(&registry);

    let address: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = Arc::new(AppState {
        registry: registry.clone(),
        catalog,
        config,
    });
    let app = rest::router(state);

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, releasing {} rooms", registry.rooms().len());
    registry.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
