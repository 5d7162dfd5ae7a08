use crate::error::{Result, RetargetError};
use crate::registry::{self, BoneKey};
use crate::skeleton::Skeleton;
use crate::types::{Bone, Index};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/////////////////////////////////////////////////////////////////////////////////////////////////

/// Standard humanoid bone roles.
///
/// Variants are declared torso first, then head, legs, arms and fingers, so
/// iterating [`HumanoidSlot::ALL`] (or a rig's populated slots) always visits a
/// slot after the slots it hangs from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HumanoidSlot {
    Hips,
    Spine,
    Chest,
    UpperChest,
    Neck,
    Head,
    LeftEye,
    RightEye,
    Jaw,

    LeftUpperLeg,
    LeftLowerLeg,
    LeftFoot,
    LeftToes,
    RightUpperLeg,
    RightLowerLeg,
    RightFoot,
    RightToes,

    LeftShoulder,
    LeftUpperArm,
    LeftLowerArm,
    LeftHand,
    RightShoulder,
    RightUpperArm,
    RightLowerArm,
    RightHand,

    LeftThumbProximal,
    LeftThumbIntermediate,
    LeftThumbDistal,
    LeftIndexProximal,
    LeftIndexIntermediate,
    LeftIndexDistal,
    LeftMiddleProximal,
    LeftMiddleIntermediate,
    LeftMiddleDistal,
    LeftRingProximal,
    LeftRingIntermediate,
    LeftRingDistal,
    LeftLittleProximal,
    LeftLittleIntermediate,
    LeftLittleDistal,

    RightThumbProximal,
    RightThumbIntermediate,
    RightThumbDistal,
    RightIndexProximal,
    RightIndexIntermediate,
    RightIndexDistal,
    RightMiddleProximal,
    RightMiddleIntermediate,
    RightMiddleDistal,
    RightRingProximal,
    RightRingIntermediate,
    RightRingDistal,
    RightLittleProximal,
    RightLittleIntermediate,
    RightLittleDistal,
}

impl HumanoidSlot {
    #[rustfmt::skip]
    pub const ALL: [HumanoidSlot; 55] = {
        use HumanoidSlot::*;
        [
            Hips, Spine, Chest, UpperChest, Neck, Head, LeftEye, RightEye, Jaw,
            LeftUpperLeg, LeftLowerLeg, LeftFoot, LeftToes,
            RightUpperLeg, RightLowerLeg, RightFoot, RightToes,
            LeftShoulder, LeftUpperArm, LeftLowerArm, LeftHand,
            RightShoulder, RightUpperArm, RightLowerArm, RightHand,
            LeftThumbProximal, LeftThumbIntermediate, LeftThumbDistal,
            LeftIndexProximal, LeftIndexIntermediate, LeftIndexDistal,
            LeftMiddleProximal, LeftMiddleIntermediate, LeftMiddleDistal,
            LeftRingProximal, LeftRingIntermediate, LeftRingDistal,
            LeftLittleProximal, LeftLittleIntermediate, LeftLittleDistal,
            RightThumbProximal, RightThumbIntermediate, RightThumbDistal,
            RightIndexProximal, RightIndexIntermediate, RightIndexDistal,
            RightMiddleProximal, RightMiddleIntermediate, RightMiddleDistal,
            RightRingProximal, RightRingIntermediate, RightRingDistal,
            RightLittleProximal, RightLittleIntermediate, RightLittleDistal,
        ]
    };

    /// camelCase role name, e.g. `leftUpperArm`.
    pub fn canonical_name(self) -> &'static str {
        use HumanoidSlot::*;
        match self {
            Hips => "hips",
            Spine => "spine",
            Chest => "chest",
            UpperChest => "upperChest",
            Neck => "neck",
            Head => "head",
            LeftEye => "leftEye",
            RightEye => "rightEye",
            Jaw => "jaw",
            LeftUpperLeg => "leftUpperLeg",
            LeftLowerLeg => "leftLowerLeg",
            LeftFoot => "leftFoot",
            LeftToes => "leftToes",
            RightUpperLeg => "rightUpperLeg",
            RightLowerLeg => "rightLowerLeg",
            RightFoot => "rightFoot",
            RightToes => "rightToes",
            LeftShoulder => "leftShoulder",
            LeftUpperArm => "leftUpperArm",
            LeftLowerArm => "leftLowerArm",
            LeftHand => "leftHand",
            RightShoulder => "rightShoulder",
            RightUpperArm => "rightUpperArm",
            RightLowerArm => "rightLowerArm",
            RightHand => "rightHand",
            LeftThumbProximal => "leftThumbProximal",
            LeftThumbIntermediate => "leftThumbIntermediate",
            LeftThumbDistal => "leftThumbDistal",
            LeftIndexProximal => "leftIndexProximal",
            LeftIndexIntermediate => "leftIndexIntermediate",
            LeftIndexDistal => "leftIndexDistal",
            LeftMiddleProximal => "leftMiddleProximal",
            LeftMiddleIntermediate => "leftMiddleIntermediate",
            LeftMiddleDistal => "leftMiddleDistal",
            LeftRingProximal => "leftRingProximal",
            LeftRingIntermediate => "leftRingIntermediate",
            LeftRingDistal => "leftRingDistal",
            LeftLittleProximal => "leftLittleProximal",
            LeftLittleIntermediate => "leftLittleIntermediate",
            LeftLittleDistal => "leftLittleDistal",
            RightThumbProximal => "rightThumbProximal",
            RightThumbIntermediate => "rightThumbIntermediate",
            RightThumbDistal => "rightThumbDistal",
            RightIndexProximal => "rightIndexProximal",
            RightIndexIntermediate => "rightIndexIntermediate",
            RightIndexDistal => "rightIndexDistal",
            RightMiddleProximal => "rightMiddleProximal",
            RightMiddleIntermediate => "rightMiddleIntermediate",
            RightMiddleDistal => "rightMiddleDistal",
            RightRingProximal => "rightRingProximal",
            RightRingIntermediate => "rightRingIntermediate",
            RightRingDistal => "rightRingDistal",
            RightLittleProximal => "rightLittleProximal",
            RightLittleIntermediate => "rightLittleIntermediate",
            RightLittleDistal => "rightLittleDistal",
        }
    }

    pub fn key(self) -> BoneKey {
        registry::normalize(self.canonical_name())
    }
}

impl fmt::Display for HumanoidSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Parses any spelling that normalizes to a canonical name ("leftUpperArm", "left_upper_arm", ...).
impl FromStr for HumanoidSlot {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let key = registry::normalize(s);
        HumanoidSlot::ALL
            .iter()
            .copied()
            .find(|slot| slot.key() == key)
            .ok_or_else(|| s.to_string())
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////////

/// A skeleton whose bones are labeled with humanoid roles.
/// Slots may stay empty (e.g. rigs without fingers).
#[derive(Debug, Clone)]
pub struct HumanoidRig {
    skeleton: Skeleton,
    slots: BTreeMap<HumanoidSlot, Index>,
}

impl HumanoidRig {
    pub fn new(skeleton: Skeleton) -> Self {
        HumanoidRig {
            skeleton,
            slots: BTreeMap::new(),
        }
    }

    /// Label bone `index` with `slot`. A bone can only fulfill one role;
    /// reassigning a slot replaces its previous bone.
    pub fn assign(&mut self, slot: HumanoidSlot, index: Index) -> Result<()> {
        let bone = self.skeleton.bone(index).ok_or_else(|| {
            RetargetError::InvalidSkeleton(format!("{slot}: bone index {index} out of range"))
        })?;
        if let Some((other, _)) = self.slots.iter().find(|(s, i)| **i == index && **s != slot) {
            return Err(RetargetError::InvalidSkeleton(format!(
                "bone '{}' is already assigned to {other}",
                bone.name
            )));
        }
        self.slots.insert(slot, index);
        Ok(())
    }

    /// Label the bone whose authored name is exactly `name`.
    pub fn assign_by_name(&mut self, slot: HumanoidSlot, name: &str) -> Result<Index> {
        let index = self
            .skeleton
            .bones()
            .iter()
            .find(|bone| bone.name == name)
            .map(|bone| bone.index)
            .ok_or_else(|| RetargetError::InvalidSkeleton(format!("{slot}: no bone named '{name}'")))?;
        self.assign(slot, index)?;
        Ok(index)
    }

    pub fn slot_index(&self, slot: HumanoidSlot) -> Option<Index> {
        self.slots.get(&slot).copied()
    }

    pub fn bone_for(&self, slot: HumanoidSlot) -> Option<&Bone> {
        self.slot_index(slot).and_then(|i| self.skeleton.bone(i))
    }

    /// Populated slots in [`HumanoidSlot`] declaration order.
    pub fn populated(&self) -> impl Iterator<Item = (HumanoidSlot, Index)> + '_ {
        self.slots.iter().map(|(&slot, &index)| (slot, index))
    }

    pub fn populated_count(&self) -> usize {
        self.slots.len()
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn skeleton_mut(&mut self) -> &mut Skeleton {
        &mut self.skeleton
    }
}
