mod http;
mod icons;
mod page;
mod ports;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use tiles_proto::config::Config;
use tiles_proto::store::TileStore;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = tiles_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Create layers: file writer + terminal
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tiles_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let icon_dir = icons::IconDir::new(config.paths.icon_dir());
    icon_dir.ensure_default()?;
    info!("Icons stored in: {:?}", icon_dir.path());

    let store = TileStore::new(config.paths.data_file.clone());
    info!("Tiles stored in: {:?}", store.path());

    let resolver = icons::IconResolver::new(&config.icons, icon_dir)?;
    info!("Icon sources: {:?}", resolver.sources());

    let state = http::AppState {
        store: Arc::new(store),
        resolver: Arc::new(resolver),
        ports: Arc::new(ports::PortScanner::detect(&config.ports)),
    };

    let app = http::router(state, &config.paths.static_dir);
    http::serve(&config.http.bind_address, config.http.port, app).await
}
