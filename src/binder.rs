//! Driver relation between a source clip and a target rig.
//!
//! Binding never edits either hierarchy. Each tick the binder reads the
//! source bones' current world rotations and writes the matching target bones'
//! local transforms, so unbinding (or rebinding) only means dropping the
//! [`BoundRig`] and putting the target back into its rest pose.

use crate::clip::{AnimationPlayback, MotionClip};
use crate::config::{LoopMode, RootMotion};
use crate::error::{Result, RetargetError};
use crate::humanoid::{HumanoidRig, HumanoidSlot};
use crate::mapper::RetargetBinding;
use crate::skeleton::Skeleton;
use crate::types::{Index, Position, Shared, Transform};
use crate::utils;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/////////////////////////////////////////////////////////////////////////////////////////////////

/// A [`RetargetBinding`] wired to the skeletons it was built for.
///
/// Both skeletons are held through `Weak` handles: the loaders own them.
#[derive(Debug)]
pub struct BoundRig {
    binding: RetargetBinding,
    target: Weak<RefCell<HumanoidRig>>,
    source: Weak<RefCell<MotionClip>>,
    /// `driver_of[target bone] = index into binding.entries()`
    driver_of: Vec<Option<usize>>,
    root_motion: Option<RootMotionState>,
}

/// Root motion scaling, fixed at bind time.
#[derive(Debug, Clone, Copy)]
struct RootMotionState {
    target: Index,
    source_reference: Position,
    scale: f64,
}

/// Wire `binding` to `target` and `source` and put the target into its rest pose.
///
/// An empty binding is valid: the target simply stays at rest.
/// Fails with [`RetargetError::AssetBusy`] when either asset is borrowed elsewhere.
pub fn bind(
    binding: RetargetBinding,
    target: &Shared<HumanoidRig>,
    source: &Shared<MotionClip>,
    root_motion: RootMotion,
) -> Result<BoundRig> {
    let mut rig = target.try_borrow_mut().map_err(|_| RetargetError::AssetBusy("humanoid rig"))?;
    let clip = source.try_borrow().map_err(|_| RetargetError::AssetBusy("motion clip"))?;

    let mut driver_of = vec![None; rig.skeleton().len()];
    for (i, entry) in binding.entries().iter().enumerate() {
        match driver_of.get_mut(entry.target) {
            Some(slot) => *slot = Some(i),
            None => debug!("{}: target bone {} not in rig, skipped", entry.slot, entry.target),
        }
    }

    let root_motion = match root_motion {
        RootMotion::Rest => None,
        RootMotion::Scaled => root_motion_state(&binding, &rig, &clip),
    };

    info!(
        "bound {} of {} target bones (root motion: {})",
        binding.len(),
        rig.skeleton().len(),
        if root_motion.is_some() { "scaled" } else { "off" }
    );

    rig.skeleton_mut().reset_to_rest();

    Ok(BoundRig {
        binding,
        target: Rc::downgrade(target),
        source: Rc::downgrade(source),
        driver_of,
        root_motion,
    })
}

/// Hips height ratio between the two rigs, used to scale the hips driver's displacement.
///
/// The source reference is the driver bone's world position in the clip's first
/// frame, which is not the clip root when the hips sit under a reference bone.
fn root_motion_state(binding: &RetargetBinding, rig: &HumanoidRig, clip: &MotionClip) -> Option<RootMotionState> {
    let Some(entry) = binding.entry_for_slot(HumanoidSlot::Hips) else {
        warn!("root motion requested but the hips are not driven");
        return None;
    };
    let target_height = rig.skeleton().bone(entry.target)?.rest_world.disp.y;
    let source_reference = clip.reference_world(entry.source)?.disp;
    let scale = if source_reference.y.abs() > f64::EPSILON {
        target_height / source_reference.y
    } else {
        1.0
    };
    Some(RootMotionState {
        target: entry.target,
        source_reference,
        scale,
    })
}

impl BoundRig {
    pub fn binding(&self) -> &RetargetBinding {
        &self.binding
    }

    /// Target rig, if its loader still holds it.
    pub fn target(&self) -> Option<Shared<HumanoidRig>> {
        self.target.upgrade()
    }

    pub fn source(&self) -> Option<Shared<MotionClip>> {
        self.source.upgrade()
    }

    /// One bound tick: advance the clock, sample the source, drive the target, mark it dirty.
    /// Returns the number of target bones written, `None` when the tick was a no-op.
    pub(crate) fn step(&mut self, delta: f64, mode: LoopMode) -> Option<usize> {
        if !self.binding.clock_mut().advance(delta) {
            return None;
        }
        let (Some(target), Some(source)) = (self.target.upgrade(), self.source.upgrade()) else {
            warn!("a bound skeleton was dropped by its loader, skipping frame");
            return None;
        };

        //// sample the clip
        let Ok(mut clip) = source.try_borrow_mut() else {
            warn!("source clip is borrowed elsewhere, skipping frame");
            return None;
        };
        let time = self.binding.clock().clip_time(clip.duration(), mode);
        clip.sample(time, mode);

        //// drive the target
        let Ok(mut rig) = target.try_borrow_mut() else {
            warn!("target rig is borrowed elsewhere, skipping frame");
            return None;
        };
        let written = self.apply(clip.skeleton(), rig.skeleton_mut());
        rig.skeleton_mut().mark_dirty();
        Some(written)
    }

    /// Write `target_world_rotation = source_world_rotation * correction` for every entry.
    ///
    /// Bones are visited in flat order so a driven bone's parent already has its
    /// final world transform for this frame. Undriven bones keep their local
    /// transform and only follow their parents.
    pub fn apply(&self, source: &Skeleton, target: &mut Skeleton) -> usize {
        let mut written = 0;
        for index in 0..target.len() {
            if let Some(entry) = self.driver_of.get(index).copied().flatten() {
                if let Some(local) = self.driven_local(entry, index, source, target) {
                    target.set_local(index, local);
                    written += 1;
                }
            }
            target.refresh_world(index);
        }
        written
    }

    fn driven_local(&self, entry: usize, index: Index, source: &Skeleton, target: &Skeleton) -> Option<Transform> {
        let entry = &self.binding.entries()[entry];
        let Some(driver) = source.bone(entry.source) else {
            debug!("{}: source bone {} missing, skipped", entry.slot, entry.source);
            return None;
        };
        let bone = target.bone(index)?;
        let parent_world = bone.parent.and_then(|p| target.bone(p)).map(|p| p.world);

        let world_rot = utils::normalize_rotation(driver.world.rot * entry.correction);
        let rot = match parent_world {
            Some(parent) => utils::normalize_rotation(parent.rot.conjugate() * world_rot),
            None => world_rot,
        };

        let mut disp = bone.rest.disp;
        if let Some(root) = self.root_motion.filter(|r| r.target == index) {
            let offset = (driver.world.disp - root.source_reference) * root.scale;
            let world_pos = bone.rest_world.disp + offset;
            disp = match parent_world {
                Some(parent) => utils::compose(
                    &utils::invert(&parent),
                    &Transform {
                        scale: 1.0,
                        rot: utils::identity_rotation(),
                        disp: world_pos,
                    },
                )
                .disp,
                None => world_pos,
            };
        }

        Some(Transform {
            scale: bone.rest.scale,
            rot,
            disp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingConfig;
    use crate::mapper::build_correspondence;
    use crate::types::Quaternion;
    use crate::utils::same_rotation;
    use cgmath::{Deg, InnerSpace, Rotation3};

    fn transform(rot: Quaternion, disp: Position) -> Transform {
        Transform { scale: 1.0, rot, disp }
    }

    fn shared_rig() -> Shared<HumanoidRig> {
        let mut b = Skeleton::builder();
        let hips = b
            .add_bone("J_Hips", None, transform(Quaternion::from_angle_y(Deg(180.0)), Position::new(0.0, 1.0, 0.0)))
            .unwrap();
        let spine = b
            .add_bone("J_Spine", Some(hips), transform(Quaternion::from_angle_x(Deg(10.0)), Position::new(0.0, 0.2, 0.0)))
            .unwrap();
        b.add_bone("J_Neck", Some(spine), transform(utils::identity_rotation(), Position::new(0.0, 0.4, 0.0)))
            .unwrap();
        let mut rig = HumanoidRig::new(b.build().unwrap());
        rig.assign(HumanoidSlot::Hips, hips).unwrap();
        rig.assign(HumanoidSlot::Spine, spine).unwrap();
        Rc::new(RefCell::new(rig))
    }

    fn shared_clip(hips_deg: &[f64]) -> Shared<MotionClip> {
        let mut b = Skeleton::builder();
        let hips = b.add_bone("Hips", None, transform(utils::identity_rotation(), Position::new(0.0, 0.0, 0.0))).unwrap();
        b.add_bone("Spine", Some(hips), transform(utils::identity_rotation(), Position::new(0.0, 10.0, 0.0)))
            .unwrap();
        let hips_track = hips_deg.iter().map(|&d| Quaternion::from_angle_z(Deg(d))).collect();
        let spine_track = hips_deg.iter().map(|_| Quaternion::from_angle_x(Deg(20.0))).collect();
        let positions = hips_deg.iter().enumerate().map(|(i, _)| Position::new(0.0, 100.0, i as f64 * 10.0)).collect();
        let clip = MotionClip::new(b.build().unwrap(), 1.0, vec![hips_track, spine_track], positions).unwrap();
        Rc::new(RefCell::new(clip))
    }

    #[test]
    fn driven_bones_follow_source_world_rotation() {
        let rig = shared_rig();
        let clip = shared_clip(&[0.0, 90.0, 90.0]);
        let binding = build_correspondence(&rig.borrow(), &*clip.borrow(), &MappingConfig::default()).unwrap();
        let mut bound = bind(binding, &rig, &clip, RootMotion::Rest).unwrap();

        assert_eq!(bound.step(1.0, LoopMode::Once), Some(2));

        let clip = clip.borrow();
        let rig = rig.borrow();
        for entry in bound.binding().entries() {
            let src = clip.skeleton().bone(entry.source).unwrap();
            let dst = rig.skeleton().bone(entry.target).unwrap();
            assert!(same_rotation(dst.world.rot, src.world.rot * entry.correction, 1e-9));
            // proportions come from the target
            assert!((dst.local.disp - dst.rest.disp).magnitude() < 1e-12);
        }
        // the undriven neck keeps its local rest transform
        let neck = &rig.skeleton().bones()[2];
        assert!(same_rotation(neck.local.rot, neck.rest.rot, 1e-12));
        assert!(rig.skeleton().is_dirty());
    }

    #[test]
    fn source_at_rest_leaves_target_at_rest() {
        let rig = shared_rig();
        let clip = shared_clip(&[0.0, 0.0]);
        {
            let binding = build_correspondence(&rig.borrow(), &*clip.borrow(), &MappingConfig::default()).unwrap();
            let bound = bind(binding, &rig, &clip, RootMotion::Rest).unwrap();
            let clip_ref = clip.borrow();
            let mut rig_mut = rig.borrow_mut();
            bound.apply(clip_ref.skeleton(), rig_mut.skeleton_mut());
        }
        let rig = rig.borrow();
        for bone in rig.skeleton().bones() {
            assert!(same_rotation(bone.world.rot, bone.rest_world.rot, 1e-9), "{}", bone.name);
            assert!((bone.world.disp - bone.rest_world.disp).magnitude() < 1e-9);
        }
    }

    #[test]
    fn empty_binding_keeps_the_rest_pose() {
        let rig = shared_rig();
        let mut b = Skeleton::builder();
        b.add_bone("pelvis_root", None, transform(Quaternion::from_angle_x(Deg(40.0)), Position::new(0.0, 0.0, 0.0)))
            .unwrap();
        let tracks = vec![vec![Quaternion::from_angle_z(Deg(70.0)); 2]];
        let clip = Rc::new(RefCell::new(MotionClip::new(b.build().unwrap(), 0.1, tracks, Vec::new()).unwrap()));

        let binding = build_correspondence(&rig.borrow(), &*clip.borrow(), &MappingConfig::default()).unwrap();
        assert!(binding.is_empty());
        let mut bound = bind(binding, &rig, &clip, RootMotion::Scaled).unwrap();
        assert_eq!(bound.step(0.05, LoopMode::Loop), Some(0));

        let rig = rig.borrow();
        for bone in rig.skeleton().bones() {
            assert!(same_rotation(bone.local.rot, bone.rest.rot, 1e-12));
            assert!(same_rotation(bone.world.rot, bone.rest_world.rot, 1e-9));
            assert!((bone.world.disp - bone.rest_world.disp).magnitude() < 1e-9);
        }
    }

    #[test]
    fn non_positive_delta_changes_nothing() {
        let rig = shared_rig();
        let clip = shared_clip(&[0.0, 90.0]);
        let binding = build_correspondence(&rig.borrow(), &*clip.borrow(), &MappingConfig::default()).unwrap();
        let mut bound = bind(binding, &rig, &clip, RootMotion::Rest).unwrap();

        let pose = |rig: &Shared<HumanoidRig>| -> Vec<(Quaternion, Position)> {
            rig.borrow().skeleton().bones().iter().map(|b| (b.world.rot, b.world.disp)).collect()
        };
        let before = pose(&rig);
        assert_eq!(bound.step(0.0, LoopMode::Loop), None);
        assert_eq!(bound.step(-1.0, LoopMode::Loop), None);
        assert_eq!(before, pose(&rig));
        assert_eq!(bound.binding().clock().elapsed(), 0.0);
    }

    #[test]
    fn scaled_root_motion_moves_the_hips() {
        let rig = shared_rig();
        let clip = shared_clip(&[0.0, 0.0, 0.0]);
        let binding = build_correspondence(&rig.borrow(), &*clip.borrow(), &MappingConfig::default()).unwrap();
        let mut bound = bind(binding, &rig, &clip, RootMotion::Scaled).unwrap();

        bound.step(1.0, LoopMode::Once);
        let rig = rig.borrow();
        // source moved 10 units forward at 100 units hips height, target hips are 1 unit high
        let hips = rig.skeleton().root();
        assert!((hips.world.disp - Position::new(0.0, 1.0, 0.1)).magnitude() < 1e-9);
    }

    #[test]
    fn root_motion_scales_from_the_hips_under_a_reference_bone() {
        let rig = shared_rig();
        let mut b = Skeleton::builder();
        let reference = b
            .add_bone("Reference", None, transform(utils::identity_rotation(), Position::new(0.0, 0.0, 0.0)))
            .unwrap();
        b.add_bone("Hips", Some(reference), transform(utils::identity_rotation(), Position::new(0.0, 100.0, 0.0)))
            .unwrap();
        let tracks = vec![vec![utils::identity_rotation(); 3]; 2];
        let positions = (0..3).map(|i| Position::new(0.0, 0.0, i as f64 * 10.0)).collect();
        let clip = Rc::new(RefCell::new(MotionClip::new(b.build().unwrap(), 1.0, tracks, positions).unwrap()));

        let binding = build_correspondence(&rig.borrow(), &*clip.borrow(), &MappingConfig::default()).unwrap();
        assert_eq!(binding.entry_for_slot(HumanoidSlot::Hips).unwrap().source, 1);
        let mut bound = bind(binding, &rig, &clip, RootMotion::Scaled).unwrap();

        bound.step(1.0, LoopMode::Once);
        let rig = rig.borrow();
        // the hips driver stands 100 units high even though the clip root is on the floor
        let hips = rig.skeleton().root();
        assert!((hips.world.disp - Position::new(0.0, 1.0, 0.1)).magnitude() < 1e-9);
    }

    #[test]
    fn borrowed_assets_refuse_to_bind() {
        let rig = shared_rig();
        let clip = shared_clip(&[0.0, 90.0]);
        let binding = build_correspondence(&rig.borrow(), &*clip.borrow(), &MappingConfig::default()).unwrap();

        {
            let _drawing = rig.borrow();
            let result = bind(binding.clone(), &rig, &clip, RootMotion::Rest);
            assert!(matches!(result, Err(RetargetError::AssetBusy("humanoid rig"))));
        }
        {
            let _sampling = clip.borrow_mut();
            let result = bind(binding.clone(), &rig, &clip, RootMotion::Rest);
            assert!(matches!(result, Err(RetargetError::AssetBusy("motion clip"))));
        }
        assert!(bind(binding, &rig, &clip, RootMotion::Rest).is_ok());
    }

    #[test]
    fn dropped_target_skips_the_frame() {
        let rig = shared_rig();
        let clip = shared_clip(&[0.0, 90.0]);
        let binding = build_correspondence(&rig.borrow(), &*clip.borrow(), &MappingConfig::default()).unwrap();
        let mut bound = bind(binding, &rig, &clip, RootMotion::Rest).unwrap();
        drop(rig);
        assert!(bound.target().is_none());
        assert_eq!(bound.step(0.5, LoopMode::Loop), None);
    }
}
