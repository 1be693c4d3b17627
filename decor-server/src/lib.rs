use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Json},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use comet_client::CometClient;

pub mod assets;
pub mod catalog;
pub mod config;
pub mod handlers;
pub mod prompt;

use catalog::Catalog;
use config::Config;

/// Shared application state: configuration and the material catalog, both
/// immutable after startup, plus the external API client when a credential
/// is configured.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub comet: Option<CometClient>,
}

impl AppState {
    pub fn new(config: Config, catalog: Catalog) -> Self {
        let comet = config.comet_api_key.as_ref().map(|key| {
            let client = CometClient::new(key.clone());
            match &config.comet_api_url {
                Some(url) => client.with_base_url(url.clone()),
                None => client,
            }
        });

        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            comet,
        }
    }

    /// The external client, or the 400 every generation endpoint returns
    /// while no credential is configured.
    pub(crate) fn comet(&self) -> Result<&CometClient, ApiError> {
        self.comet
            .as_ref()
            .ok_or_else(|| bad_request("Missing COMET_API_KEY"))
    }
}

/// Global texture selection sent by the client. Empty strings count as
/// "nothing selected".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextureSelection {
    #[serde(default)]
    pub wall: Option<String>,
    #[serde(default)]
    pub floor: Option<String>,
    #[serde(default)]
    pub doors: Option<String>,
    #[serde(default)]
    pub fabric: Option<String>,
}

impl TextureSelection {
    pub fn wall_id(&self) -> Option<&str> {
        pick(&self.wall)
    }

    pub fn floor_id(&self) -> Option<&str> {
        pick(&self.floor)
    }

    pub fn doors_id(&self) -> Option<&str> {
        pick(&self.doors)
    }

    pub fn fabric_id(&self) -> Option<&str> {
        pick(&self.fabric)
    }
}

/// One room of a visualization request, with optional per-room wall/floor
/// overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct Room {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub room_type: String,
    #[serde(default, rename = "wallTex")]
    pub wall_tex: Option<String>,
    #[serde(default, rename = "floorTex")]
    pub floor_tex: Option<String>,
}

impl Room {
    pub fn wall_id(&self) -> Option<&str> {
        pick(&self.wall_tex)
    }

    pub fn floor_id(&self) -> Option<&str> {
        pick(&self.floor_tex)
    }
}

fn pick(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler error type: status plus the `{ "error": ... }` wire body.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub(crate) fn server_error(message: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Build the full application router. Exposed so integration tests can drive
/// the app against an ephemeral listener.
pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(state.config.allowed_origins.as_deref());

    Router::new()
        .route("/health", get(health_check))
        .route("/api/upload", post(handlers::upload))
        .route("/api/plan/decorate", post(handlers::decorate))
        .route("/api/visualize", post(handlers::visualize))
        .route("/api/tasks/:id", get(handlers::task_status))
        .nest_service("/uploads", ServeDir::new(&state.config.uploads_dir))
        .nest_service("/assets", ServeDir::new(&state.config.assets_dir))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // matches the 20mb client body cap
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_selection_treats_blank_ids_as_unselected() {
        let selection = TextureSelection {
            wall: Some("wall_marble_dark_green".to_string()),
            floor: Some("".to_string()),
            doors: Some("   ".to_string()),
            fabric: None,
        };

        assert_eq!(selection.wall_id(), Some("wall_marble_dark_green"));
        assert_eq!(selection.floor_id(), None);
        assert_eq!(selection.doors_id(), None);
        assert_eq!(selection.fabric_id(), None);
    }

    #[test]
    fn room_parses_client_field_names() {
        let room: Room = serde_json::from_value(serde_json::json!({
            "name": "Left Bedroom",
            "type": "bedroom",
            "wallTex": "wall_marble_dark_green"
        }))
        .unwrap();

        assert_eq!(room.room_type, "bedroom");
        assert_eq!(room.wall_id(), Some("wall_marble_dark_green"));
        assert_eq!(room.floor_id(), None);
    }

    #[test]
    fn state_without_credential_has_no_client() {
        let config = Config {
            port: 0,
            base_url: "http://localhost:0".to_string(),
            comet_api_key: None,
            comet_api_url: None,
            assets_dir: "assets".into(),
            uploads_dir: "uploads".into(),
            allowed_origins: None,
        };

        let state = AppState::new(config, Catalog::empty());
        assert!(state.comet.is_none());
        assert!(state.comet().is_err());
    }
}
