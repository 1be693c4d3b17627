use tracing::{info, warn};

use decor_server::catalog::Catalog;
use decor_server::config::Config;
use decor_server::{assets, create_app, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting plan decor server");

    let config = Config::from_env();

    if let Err(e) = assets::extract_texture_pack(&config.assets_dir) {
        warn!("texture pack extraction failed: {:#}", e);
    }
    if let Err(e) = std::fs::create_dir_all(&config.uploads_dir) {
        warn!(
            "could not create uploads dir {}: {}",
            config.uploads_dir.display(),
            e
        );
    }

    let textures_dir = config.assets_dir.join("textures");
    let catalog = Catalog::load(&[textures_dir.as_path(), config.assets_dir.as_path()]);
    if catalog.is_empty() {
        warn!("material catalog is empty; prompts will use fallback phrases");
    }
    if config.comet_api_key.is_none() {
        warn!("COMET_API_KEY not set; generation endpoints will reject requests");
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let base_url = config.base_url.clone();
    let app = create_app(AppState::new(config, catalog));

    info!("API listening on {}", addr);
    info!("Assets: {}/assets", base_url);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
