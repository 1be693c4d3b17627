use std::fs::File;
use std::path::Path;

use anyhow::Context;
use tracing::info;

/// Unpack the bundled texture archive on first start.
///
/// Skipped when `<assets_dir>/textures` already exists or no archive is
/// present. Returns whether an extraction actually happened.
pub fn extract_texture_pack(assets_dir: &Path) -> anyhow::Result<bool> {
    let textures_dir = assets_dir.join("textures");
    let zip_path = assets_dir.join("textures_pack.zip");

    if textures_dir.exists() || !zip_path.exists() {
        return Ok(false);
    }

    let file = File::open(&zip_path)
        .with_context(|| format!("failed to open {}", zip_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("failed to read {}", zip_path.display()))?;
    archive
        .extract(assets_dir)
        .with_context(|| format!("failed to extract {}", zip_path.display()))?;

    info!("extracted textures_pack.zip into {}", assets_dir.display());
    Ok(true)
}
