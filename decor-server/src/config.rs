use std::path::PathBuf;

use tracing::warn;

pub const DEFAULT_PORT: u16 = 4000;

/// Runtime configuration, read from the environment once at startup and
/// passed around as a value from there on.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen port.
    pub port: u16,
    /// Publicly reachable base URL, used when deriving upload and asset URLs.
    pub base_url: String,
    /// Credential for the external prediction API; generation endpoints
    /// reject requests while this is unset.
    pub comet_api_key: Option<String>,
    /// Override for the external API host (staging, tests).
    pub comet_api_url: Option<String>,
    /// Directory holding the texture pack and catalog.
    pub assets_dir: PathBuf,
    /// Directory uploaded plans are written to.
    pub uploads_dir: PathBuf,
    /// Comma-separated CORS origins; empty means any origin.
    pub allowed_origins: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("PORT value {:?} is not a valid port, using {}", raw, DEFAULT_PORT);
                DEFAULT_PORT
            }),
            Err(_) => DEFAULT_PORT,
        };

        let base_url = std::env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        Self {
            port,
            base_url,
            comet_api_key: std::env::var("COMET_API_KEY").ok().filter(|k| !k.is_empty()),
            comet_api_url: std::env::var("COMET_API_URL").ok().filter(|u| !u.is_empty()),
            assets_dir: std::env::var("ASSETS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("assets")),
            uploads_dir: std::env::var("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            allowed_origins: std::env::var("ALLOWED_ORIGINS").ok().filter(|o| !o.is_empty()),
        }
    }
}
