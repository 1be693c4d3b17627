//! Prompt assembly for the two generation modes.
//!
//! Both builders are pure: the same selection and catalog always produce the
//! same string. Ids that do not resolve in the catalog degrade to a fallback
//! phrase instead of erroring.

use crate::catalog::Catalog;
use crate::{Room, TextureSelection};

/// Instruction string for the material-overlay mode: geometry untouched,
/// surfaces re-textured.
pub fn overlay_prompt(textures: &TextureSelection, catalog: &Catalog) -> String {
    let resolved = |id: Option<&str>| -> String {
        match id.and_then(|id| catalog.resolve(id)) {
            Some(m) => format!("{} (repeat {} m)", m.id, m.scale_m_per_repeat),
            None => "as uploaded".to_string(),
        }
    };
    // Doors and fabrics have a genuine "nothing selected" state; walls and
    // floors always render a clause.
    let optional = |id: Option<&str>| -> String {
        match id {
            Some(id) => resolved(Some(id)),
            None => "keep original".to_string(),
        }
    };

    [
        "Top-down interior plan MATERIAL OVERLAY ONLY. Keep geometry 100% identical: \
         walls, doors, windows unchanged; do not move or redraw."
            .to_string(),
        format!(
            "Walls: {}; Floor: {}; Doors: {}; Fabrics: {}.",
            resolved(textures.wall_id()),
            resolved(textures.floor_id()),
            optional(textures.doors_id()),
            optional(textures.fabric_id()),
        ),
        "No new objects. No text or logos. Keep same resolution.".to_string(),
    ]
    .join(" ")
}

/// Instruction string for a single-room photorealistic render. Room-level
/// texture overrides win over the global selection; neither resolving leaves
/// the finish "neutral".
pub fn room_prompt(room: &Room, textures: &TextureSelection, catalog: &Catalog) -> String {
    let finish = |id: Option<&str>| -> String {
        match id.and_then(|id| catalog.resolve(id)) {
            Some(m) => format!("{} at scale {} m", m.id, m.scale_m_per_repeat),
            None => "neutral".to_string(),
        }
    };

    let room_type = match room.room_type.trim() {
        "" => "room",
        t => t,
    };

    [
        format!(
            "Photorealistic interior perspective of a {} based on plan (do not change layout).",
            room_type
        ),
        format!(
            "Finishes: walls -> {}, floor -> {}.",
            finish(room.wall_id().or_else(|| textures.wall_id())),
            finish(room.floor_id().or_else(|| textures.floor_id())),
        ),
        "Respect implied door/window positions. No extra walls, no text.".to_string(),
    ]
    .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Material;

    fn catalog() -> Catalog {
        Catalog {
            materials: vec![
                Material {
                    id: "wall_marble_dark_green".to_string(),
                    albedo_url: "textures/walls/marble/albedo.png".to_string(),
                    scale_m_per_repeat: 0.6,
                },
                Material {
                    id: "floor_planks_linear_olive".to_string(),
                    albedo_url: "textures/floors/planks/albedo.png".to_string(),
                    scale_m_per_repeat: 1.2,
                },
                Material {
                    id: "fabric_velvet_deep_green".to_string(),
                    albedo_url: "textures/fabrics/velvet/albedo.png".to_string(),
                    scale_m_per_repeat: 0.25,
                },
            ],
        }
    }

    fn selection(wall: &str, floor: &str, doors: &str, fabric: &str) -> TextureSelection {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        TextureSelection {
            wall: opt(wall),
            floor: opt(floor),
            doors: opt(doors),
            fabric: opt(fabric),
        }
    }

    #[test]
    fn overlay_prompt_names_resolved_materials_with_repeat_scale() {
        let prompt = overlay_prompt(
            &selection("wall_marble_dark_green", "floor_planks_linear_olive", "", ""),
            &catalog(),
        );

        assert!(prompt.contains("Walls: wall_marble_dark_green (repeat 0.6 m)"));
        assert!(prompt.contains("Floor: floor_planks_linear_olive (repeat 1.2 m)"));
    }

    #[test]
    fn overlay_prompt_exact_shape_with_fallbacks() {
        let prompt = overlay_prompt(&selection("wall_marble_dark_green", "", "", ""), &catalog());

        assert_eq!(
            prompt,
            "Top-down interior plan MATERIAL OVERLAY ONLY. Keep geometry 100% identical: \
             walls, doors, windows unchanged; do not move or redraw. \
             Walls: wall_marble_dark_green (repeat 0.6 m); Floor: as uploaded; \
             Doors: keep original; Fabrics: keep original. \
             No new objects. No text or logos. Keep same resolution."
        );
    }

    #[test]
    fn overlay_prompt_degrades_unresolved_ids_without_error() {
        // Selected but unknown ids read "as uploaded"; unselected optional
        // surfaces read "keep original".
        let prompt = overlay_prompt(
            &selection("wall_we_never_shipped", "", "door_we_never_shipped", ""),
            &catalog(),
        );

        assert!(prompt.contains("Walls: as uploaded"));
        assert!(prompt.contains("Doors: as uploaded"));
        assert!(prompt.contains("Fabrics: keep original"));
    }

    #[test]
    fn overlay_prompt_is_deterministic() {
        let sel = selection("wall_marble_dark_green", "floor_planks_linear_olive", "", "x");
        let cat = catalog();
        assert_eq!(overlay_prompt(&sel, &cat), overlay_prompt(&sel, &cat));
    }

    #[test]
    fn overlay_prompt_with_empty_catalog_keeps_everything_as_uploaded() {
        let prompt = overlay_prompt(
            &selection("wall_marble_dark_green", "floor_planks_linear_olive", "", ""),
            &Catalog::empty(),
        );

        assert!(prompt.contains("Walls: as uploaded; Floor: as uploaded"));
    }

    #[test]
    fn room_prompt_prefers_room_overrides_over_global_selection() {
        let room = Room {
            name: "Left Bedroom".to_string(),
            room_type: "bedroom".to_string(),
            wall_tex: Some("wall_marble_dark_green".to_string()),
            floor_tex: None,
        };
        let prompt = room_prompt(
            &room,
            &selection("wall_we_never_shipped", "floor_planks_linear_olive", "", ""),
            &catalog(),
        );

        assert!(prompt.contains("Photorealistic interior perspective of a bedroom"));
        assert!(prompt.contains("walls -> wall_marble_dark_green at scale 0.6 m"));
        assert!(prompt.contains("floor -> floor_planks_linear_olive at scale 1.2 m"));
    }

    #[test]
    fn room_prompt_falls_back_to_neutral_and_generic_room() {
        let room = Room {
            name: "Closet".to_string(),
            room_type: "".to_string(),
            wall_tex: None,
            floor_tex: None,
        };
        let prompt = room_prompt(&room, &TextureSelection::default(), &catalog());

        assert!(prompt.contains("perspective of a room based on plan"));
        assert!(prompt.contains("walls -> neutral, floor -> neutral"));
    }
}
