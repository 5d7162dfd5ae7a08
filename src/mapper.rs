use crate::adapter::SkeletonAdapter;
use crate::clip::AnimationClock;
use crate::config::MappingConfig;
use crate::error::{Result, RetargetError};
use crate::humanoid::{HumanoidRig, HumanoidSlot};
use crate::types::{Bone, Index, Quaternion};
use crate::utils;
use log::{debug, info};

/////////////////////////////////////////////////////////////////////////////////////////////////

/// One source bone driving one target bone.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceEntry {
    pub slot: HumanoidSlot,
    /// Index of the driving bone in the source skeleton.
    pub source: Index,
    /// Index of the driven bone in the target skeleton.
    pub target: Index,
    /// Rest pose reconciliation: `source_rest_world * correction == target_rest_world`.
    pub correction: Quaternion,
}

/// Everything needed to drive one target rig from one source clip.
///
/// The entries are fixed once built. To change them, build a new binding.
#[derive(Debug, Clone, PartialEq)]
pub struct RetargetBinding {
    entries: Vec<CorrespondenceEntry>,
    clock: AnimationClock,
}

impl RetargetBinding {
    /// Entries in humanoid slot order.
    pub fn entries(&self) -> &[CorrespondenceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_for_slot(&self, slot: HumanoidSlot) -> Option<&CorrespondenceEntry> {
        self.entries.iter().find(|e| e.slot == slot)
    }

    pub fn entry_for_target(&self, target: Index) -> Option<&CorrespondenceEntry> {
        self.entries.iter().find(|e| e.target == target)
    }

    pub fn clock(&self) -> &AnimationClock {
        &self.clock
    }

    pub(crate) fn clock_mut(&mut self) -> &mut AnimationClock {
        &mut self.clock
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////////

/// Source bone for `slot`: the slot's canonical name first, then the configured aliases.
/// For every name tried, the first bone in the source's flat order wins.
fn find_source_bone<'a, S: SkeletonAdapter + ?Sized>(
    source: &'a S,
    slot: HumanoidSlot,
    mapping: &MappingConfig,
) -> Option<&'a Bone> {
    std::iter::once(slot.canonical_name())
        .chain(mapping.aliases(slot).iter().map(String::as_str))
        .find_map(|name| source.find_by_name(name))
}

/// Match every populated slot of `rig` against the bones of `source`.
///
/// Slots without a matching source bone are skipped; a partial correspondence
/// (or an empty one) is a valid result. Fails only if the rig has no populated
/// slot at all. The result depends on nothing but the two skeletons and
/// `mapping`, so building twice gives identical bindings.
pub fn build_correspondence<S: SkeletonAdapter + ?Sized>(
    rig: &HumanoidRig,
    source: &S,
    mapping: &MappingConfig,
) -> Result<RetargetBinding> {
    if rig.populated_count() == 0 {
        return Err(RetargetError::MissingHumanoidData);
    }

    let target_skeleton = rig.skeleton();
    let mut driven = vec![false; target_skeleton.len()];
    let mut entries = Vec::new();

    for (slot, target_index) in rig.populated() {
        let Some(target) = target_skeleton.bone(target_index) else {
            debug!("{slot}: target bone {target_index} missing, skipped");
            continue;
        };
        let Some(source_bone) = find_source_bone(source, slot, mapping) else {
            debug!("{slot}: no matching source bone");
            continue;
        };
        //// one driver per driven bone
        if driven[target_index] {
            debug!("{slot}: target bone '{}' is already driven", target.name);
            continue;
        }
        driven[target_index] = true;

        let correction = utils::rotation_offset(source_bone.rest_world.rot, target.rest_world.rot);
        debug!("{slot}: '{}' drives '{}'", source_bone.name, target.name);
        entries.push(CorrespondenceEntry {
            slot,
            source: source_bone.index,
            target: target_index,
            correction,
        });
    }

    info!(
        "correspondence built: {} of {} populated slots driven",
        entries.len(),
        rig.populated_count()
    );
    Ok(RetargetBinding {
        entries,
        clock: AnimationClock::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Skeleton;
    use crate::types::{Position, Transform};
    use crate::utils::same_rotation;
    use cgmath::{Deg, Rotation3};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn bone(rot: Quaternion, y: f64) -> Transform {
        Transform {
            scale: 1.0,
            rot,
            disp: Position::new(0.0, y, 0.0),
        }
    }

    fn source(names: &[&str]) -> Skeleton {
        let mut b = Skeleton::builder();
        let root = b.add_bone(names[0], None, bone(Quaternion::from_angle_z(Deg(30.0)), 1.0)).unwrap();
        for name in &names[1..] {
            b.add_bone(*name, Some(root), bone(utils::identity_rotation(), 0.2)).unwrap();
        }
        b.build().unwrap()
    }

    fn rig() -> HumanoidRig {
        let mut b = Skeleton::builder();
        let hips = b.add_bone("J_Hips", None, bone(Quaternion::from_angle_y(Deg(180.0)), 0.9)).unwrap();
        let spine = b.add_bone("J_Spine", Some(hips), bone(utils::identity_rotation(), 0.1)).unwrap();
        let arm = b.add_bone("J_UpperArm_L", Some(spine), bone(utils::identity_rotation(), 0.3)).unwrap();
        let mut rig = HumanoidRig::new(b.build().unwrap());
        rig.assign(HumanoidSlot::Hips, hips).unwrap();
        rig.assign(HumanoidSlot::Spine, spine).unwrap();
        rig.assign(HumanoidSlot::LeftUpperArm, arm).unwrap();
        rig
    }

    #[test]
    fn rig_without_slots_is_missing_humanoid_data() {
        let rig = HumanoidRig::new(source(&["Hips"]));
        let err = build_correspondence(&rig, &source(&["Hips"]), &MappingConfig::default()).unwrap_err();
        assert!(matches!(err, RetargetError::MissingHumanoidData));
    }

    #[test]
    fn correction_maps_source_rest_onto_target_rest() {
        let rig = rig();
        let src = source(&["Hips", "spine"]);
        let binding = build_correspondence(&rig, &src, &MappingConfig::default()).unwrap();
        assert_eq!(binding.len(), 2);

        for entry in binding.entries() {
            let s = src.bone(entry.source).unwrap().rest_world.rot;
            let t = rig.skeleton().bone(entry.target).unwrap().rest_world.rot;
            assert!(same_rotation(s * entry.correction, t, 1e-9));
        }
        assert!(binding.entry_for_slot(HumanoidSlot::LeftUpperArm).is_none());
        assert_eq!(binding.clock().elapsed(), 0.0);
    }

    #[test]
    fn first_source_bone_in_flat_order_wins() {
        let rig = rig();
        let src = source(&["Root", "SPINE", "spine", "Spine_"]);
        let binding = build_correspondence(&rig, &src, &MappingConfig::default()).unwrap();
        let spine = binding.entry_for_slot(HumanoidSlot::Spine).unwrap();
        assert_eq!(src.bone(spine.source).unwrap().name, "SPINE");

        let again = build_correspondence(&rig, &src, &MappingConfig::default()).unwrap();
        assert_eq!(binding, again);
    }

    #[test]
    fn aliases_are_tried_after_the_canonical_name() {
        let rig = rig();
        let src = source(&["Hips", "LeftArm", "L_UpperArm"]);
        let mut aliases = BTreeMap::new();
        aliases.insert(
            HumanoidSlot::LeftUpperArm,
            vec!["L_UpperArm".to_string(), "LeftArm".to_string()],
        );
        let mapping = MappingConfig { aliases };
        assert_eq!(mapping.aliases(HumanoidSlot::LeftUpperArm)[0], "L_UpperArm");
        assert!(mapping.aliases(HumanoidSlot::RightUpperArm).is_empty());

        let binding = build_correspondence(&rig, &src, &mapping).unwrap();
        let arm = binding.entry_for_slot(HumanoidSlot::LeftUpperArm).unwrap();
        assert_eq!(src.bone(arm.source).unwrap().name, "L_UpperArm");

        let without = build_correspondence(&rig, &src, &MappingConfig::default()).unwrap();
        assert!(without.entry_for_slot(HumanoidSlot::LeftUpperArm).is_none());
    }

    #[test]
    fn every_target_bone_has_at_most_one_driver() {
        let rig = rig();
        let src = source(&["Hips", "Spine", "LeftUpperArm", "hips"]);
        let binding = build_correspondence(&rig, &src, &MappingConfig::default()).unwrap();
        let mut targets: Vec<Index> = binding.entries().iter().map(|e| e.target).collect();
        let total = targets.len();
        targets.sort();
        targets.dedup();
        assert_eq!(targets.len(), total);
        assert_eq!(total, 3);
    }
}
