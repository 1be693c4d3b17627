use std::path::Path as FsPath;

use axum::extract::{Json, Multipart, Path, State};
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use comet_client::{Prediction, PredictionInput};

use crate::catalog::{self, Catalog};
use crate::{bad_request, prompt, server_error, ApiError, AppState, Room, TextureSelection};

/// The external contract carries at most three reference images
/// (`input_image_2..4`).
const REFERENCE_SLOTS: usize = 3;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

/// `POST /api/upload` — store one multipart `file` field under a
/// timestamp-derived name and hand back its public URL.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart payload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let ext = field
            .file_name()
            .map(extension_of)
            .unwrap_or_else(|| ".png".to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;

        let filename = format!("plan_{}{}", Utc::now().timestamp_millis(), ext);
        tokio::fs::create_dir_all(&state.config.uploads_dir)
            .await
            .map_err(|e| server_error(format!("failed to create uploads dir: {}", e)))?;
        tokio::fs::write(state.config.uploads_dir.join(&filename), &data)
            .await
            .map_err(|e| server_error(format!("failed to store upload: {}", e)))?;

        info!("stored plan upload {} ({} bytes)", filename, data.len());

        return Ok(Json(UploadResponse {
            url: format!("{}/uploads/{}", state.config.base_url, filename),
        }));
    }

    Err(bad_request("multipart field \"file\" is required"))
}

/// File extension including the dot, defaulting to `.png`.
fn extension_of(original_name: &str) -> String {
    match FsPath::new(original_name).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!(".{}", ext),
        _ => ".png".to_string(),
    }
}

#[derive(Debug, Deserialize)]
pub struct DecorateRequest {
    #[serde(default, rename = "planUrl")]
    pub plan_url: Option<String>,
    #[serde(default)]
    pub textures: TextureSelection,
    #[serde(default = "default_overlay_aspect")]
    pub aspect_ratio: String,
}

fn default_overlay_aspect() -> String {
    "1:1".to_string()
}

fn default_room_aspect() -> String {
    "16:9".to_string()
}

/// `POST /api/plan/decorate` — build the overlay prompt, attach reference
/// images, submit one prediction and return the external response verbatim.
pub async fn decorate(
    State(state): State<AppState>,
    Json(request): Json<DecorateRequest>,
) -> Result<Json<Prediction>, ApiError> {
    let comet = state.comet()?;
    let plan_url = required_plan_url(&request.plan_url)?;

    let textures = &request.textures;
    let refs = reference_urls(
        [
            textures.wall_id(),
            textures.floor_id(),
            textures.doors_id(),
            textures.fabric_id(),
        ],
        &state.catalog,
        &state.config.base_url,
    );
    let prompt = prompt::overlay_prompt(textures, &state.catalog);

    info!(
        "decorate request for {} ({} reference images)",
        plan_url,
        refs.len()
    );

    let input = PredictionInput::new(prompt, plan_url, request.aspect_ratio.clone())
        .with_references(&refs);
    let prediction = comet
        .create_prediction(&input)
        .await
        .map_err(|e| server_error(format!("{:#}", e)))?;

    Ok(Json(prediction))
}

#[derive(Debug, Deserialize)]
pub struct VisualizeRequest {
    #[serde(default, rename = "planUrl")]
    pub plan_url: Option<String>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub textures: TextureSelection,
    #[serde(default = "default_room_aspect")]
    pub aspect_ratio: String,
}

#[derive(Debug, Serialize)]
pub struct VisualizeResponse {
    pub tasks: Vec<RoomTask>,
}

/// Per-room submission result: either a tracked task or that room's error.
#[derive(Debug, Serialize)]
pub struct RoomTask {
    pub room: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /api/visualize` — one prediction per room, submitted concurrently.
/// Failures are isolated per room; one bad submission does not discard the
/// rest of the batch.
pub async fn visualize(
    State(state): State<AppState>,
    Json(request): Json<VisualizeRequest>,
) -> Result<Json<VisualizeResponse>, ApiError> {
    let comet = state.comet()?.clone();
    let plan_url = required_plan_url(&request.plan_url)?.to_string();

    if request.rooms.is_empty() {
        return Ok(Json(VisualizeResponse { tasks: vec![] }));
    }

    info!(
        "visualize request for {} ({} rooms)",
        plan_url,
        request.rooms.len()
    );

    let submissions = request.rooms.iter().map(|room| {
        let comet = comet.clone();
        let room_name = room.name.clone();
        let textures = &request.textures;

        let refs = reference_urls(
            [
                room.wall_id().or_else(|| textures.wall_id()),
                room.floor_id().or_else(|| textures.floor_id()),
                textures.doors_id(),
                textures.fabric_id(),
            ],
            &state.catalog,
            &state.config.base_url,
        );
        let prompt = prompt::room_prompt(room, textures, &state.catalog);
        let input = PredictionInput::new(prompt, plan_url.clone(), request.aspect_ratio.clone())
            .with_references(&refs);

        async move {
            match comet.create_prediction(&input).await {
                Ok(prediction) => RoomTask {
                    room: room_name,
                    id: Some(prediction.id),
                    get: prediction.urls.and_then(|u| u.get),
                    error: None,
                },
                Err(e) => {
                    warn!("room {} submission failed: {:#}", room_name, e);
                    RoomTask {
                        room: room_name,
                        id: None,
                        get: None,
                        error: Some(format!("{:#}", e)),
                    }
                }
            }
        }
    });

    let tasks = join_all(submissions).await;

    Ok(Json(VisualizeResponse { tasks }))
}

/// `GET /api/tasks/:id` — pass the external status lookup through verbatim.
pub async fn task_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Prediction>, ApiError> {
    let comet = state.comet()?;
    let prediction = comet
        .get_prediction(&id)
        .await
        .map_err(|e| server_error(format!("{:#}", e)))?;

    Ok(Json(prediction))
}

fn required_plan_url(plan_url: &Option<String>) -> Result<&str, ApiError> {
    plan_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| bad_request("planUrl required"))
}

/// Resolve reference image URLs from candidate ids in fixed priority order.
/// Both generation endpoints share this rule; ids missing from the catalog
/// contribute nothing, and only the first [`REFERENCE_SLOTS`] survivors are
/// wired into the request.
fn reference_urls(
    candidates: [Option<&str>; 4],
    catalog: &Catalog,
    base_url: &str,
) -> Vec<String> {
    candidates
        .into_iter()
        .flatten()
        .filter_map(|id| catalog.resolve(id))
        .map(|m| catalog::reference_url(m, base_url))
        .take(REFERENCE_SLOTS)
        .collect()
}
