//! Humanoid rig descriptions stored as JSON.
//!
//! ```json
//! {
//!   "bones": [
//!     { "name": "J_Bip_C_Hips", "translation": [0.0, 0.9, 0.0] },
//!     { "name": "J_Bip_C_Spine", "parent": "J_Bip_C_Hips", "translation": [0.0, 0.05, 0.0],
//!       "rotation": [0.0, 0.0, 0.0, 1.0] }
//!   ],
//!   "humanoid": { "hips": "J_Bip_C_Hips", "spine": "J_Bip_C_Spine" }
//! }
//! ```
//!
//! Bones are listed parents first. `rotation` is a unit quaternion `[x, y, z, w]`.

use crate::error::AssetLoadError;
use crate::humanoid::{HumanoidRig, HumanoidSlot};
use crate::skeleton::Skeleton;
use crate::types::{Index, Position, Quaternion, Transform};
use crate::utils;
use log::debug;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RigDocument {
    bones: Vec<BoneEntry>,
    #[serde(default)]
    humanoid: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct BoneEntry {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    translation: [f64; 3],
    #[serde(default = "identity_xyzw")]
    rotation: [f64; 4],
    #[serde(default = "unit_scale")]
    scale: f64,
}

fn identity_xyzw() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn unit_scale() -> f64 {
    1.0
}

impl BoneEntry {
    fn rest(&self) -> Transform {
        let [x, y, z, w] = self.rotation;
        Transform {
            scale: self.scale,
            rot: utils::normalize_rotation(Quaternion::new(w, x, y, z)),
            disp: Position::from(self.translation),
        }
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////////

/// Load a rig description from a .json file.
pub fn load_rig_from_file(file_path: impl AsRef<Path>) -> Result<HumanoidRig, AssetLoadError> {
    let contents = std::fs::read_to_string(file_path)?;
    load_rig_from_str(&contents)
}

/// Load a rig description from a JSON string.
pub fn load_rig_from_str(json: &str) -> Result<HumanoidRig, AssetLoadError> {
    let document: RigDocument = serde_json::from_str(json)?;

    //// hierarchy
    let mut builder = Skeleton::builder();
    let mut by_name: HashMap<&str, Index> = HashMap::new();
    for entry in &document.bones {
        let parent = match &entry.parent {
            Some(parent) => Some(
                *by_name
                    .get(parent.as_str())
                    .ok_or_else(|| AssetLoadError::UnknownBone(parent.clone()))?,
            ),
            None => None,
        };
        let index = builder
            .add_bone(entry.name.as_str(), parent, entry.rest())
            .map_err(|e| AssetLoadError::Skeleton(e.to_string()))?;
        if by_name.insert(entry.name.as_str(), index).is_some() {
            return Err(AssetLoadError::Skeleton(format!("bone '{}' is declared twice", entry.name)));
        }
    }
    let skeleton = builder.build().map_err(|e| AssetLoadError::Skeleton(e.to_string()))?;

    //// humanoid labels
    let mut rig = HumanoidRig::new(skeleton);
    for (slot_name, bone_name) in &document.humanoid {
        let slot: HumanoidSlot = slot_name
            .parse()
            .map_err(|_| AssetLoadError::UnknownSlot(slot_name.clone()))?;
        let index = *by_name
            .get(bone_name.as_str())
            .ok_or_else(|| AssetLoadError::UnknownBone(bone_name.clone()))?;
        rig.assign(slot, index)
            .map_err(|e| AssetLoadError::Skeleton(e.to_string()))?;
    }

    debug!(
        "rig loaded: {} bones, {} humanoid slots",
        rig.skeleton().len(),
        rig.populated_count()
    );
    Ok(rig)
}
