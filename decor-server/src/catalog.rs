use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One entry of the material catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: String,
    /// Path to the albedo texture, somewhere under the assets tree.
    pub albedo_url: String,
    /// Physical scale: meters covered by one texture repeat.
    pub scale_m_per_repeat: f64,
}

/// The static material registry, loaded once at startup and immutable
/// afterwards. A missing or malformed catalog file degrades to an empty
/// catalog; prompts then fall back to their neutral phrasing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub materials: Vec<Material>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn resolve(&self, id: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Locate and parse `catalog.json` under any of the given roots.
    /// Never fails: problems are logged and yield an empty catalog.
    pub fn load(roots: &[&Path]) -> Self {
        let Some(path) = find_catalog_file(roots) else {
            warn!("catalog.json not found, continuing without a material catalog");
            return Self::empty();
        };

        match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str::<Catalog>(&raw).map_err(anyhow::Error::from))
        {
            Ok(catalog) => {
                info!(
                    "loaded catalog from {} ({} materials)",
                    path.display(),
                    catalog.materials.len()
                );
                catalog
            }
            Err(e) => {
                warn!("failed to load catalog {}: {:#}", path.display(), e);
                Self::empty()
            }
        }
    }
}

/// Depth-first search of the given roots for a file named `catalog.json`
/// (case-insensitive). Unreadable directories are skipped.
pub fn find_catalog_file(roots: &[&Path]) -> Option<PathBuf> {
    let mut stack: Vec<PathBuf> = roots
        .iter()
        .filter(|r| r.exists())
        .map(|r| r.to_path_buf())
        .collect();

    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.eq_ignore_ascii_case("catalog.json"))
            {
                return Some(path);
            }
        }
    }

    None
}

/// Public URL for a material's albedo texture.
///
/// Catalog files sometimes carry full local paths; the meaningful part
/// starts at the `textures/` component, which is re-rooted under the
/// server's `/assets/` mount. Paths without a `textures/` component are
/// served under `/assets/` as given.
pub fn reference_url(material: &Material, base_url: &str) -> String {
    let normalized = material.albedo_url.replace('\\', "/");
    let components: Vec<&str> = normalized.split('/').filter(|c| !c.is_empty()).collect();

    let tail = match components.iter().position(|c| *c == "textures") {
        Some(idx) => components[idx..].join("/"),
        None => components.join("/"),
    };

    format!("{}/assets/{}", base_url, tail)
}
