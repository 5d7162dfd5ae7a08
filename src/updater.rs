//! Frame driven lifecycle of one retargeting setup.
//!
//! ```text
//!  Idle ──(both assets loaded, bind)──> Bound ──(stop)──> Stopped
//!   └──────────────────(stop)─────────────────────────────────┘
//! ```
//!
//! Assets arrive through [`LoadSlot`]s, one-shot completion handles that only
//! hold a `Weak` reference to the updater. Completing a slot after the updater
//! was dropped (or stopped) does nothing.

use crate::binder::{self, BoundRig};
use crate::clip::MotionClip;
use crate::config::RetargetConfig;
use crate::error::{AssetLoadError, Result, RetargetError};
use crate::humanoid::HumanoidRig;
use crate::mapper::{self, RetargetBinding};
use crate::types::Shared;
use log::{debug, error, info};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdaterState {
    Idle,
    Bound,
    Stopped,
}

/// What a call to [`FrameUpdater::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Still waiting for assets, or binding failed.
    Idle,
    /// Nothing changed: non-positive delta, or a skeleton was unavailable this frame.
    Skipped,
    /// `driven` target bones were written for clock time `time`.
    Driven { driven: usize, time: f64 },
    Stopped,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Bound(BoundRig),
    Stopped,
}

/// Assets delivered so far. Owns the loaded rig and clip.
#[derive(Debug, Default)]
struct PendingAssets {
    rig: Option<Shared<HumanoidRig>>,
    motion: Option<Shared<MotionClip>>,
    failure: Option<AssetLoadError>,
    /// Bumped on every delivered asset.
    generation: u64,
}

/////////////////////////////////////////////////////////////////////////////////////////////////

/// One-shot completion handle for an asset load.
pub struct LoadSlot<T> {
    kind: &'static str,
    pending: Weak<RefCell<PendingAssets>>,
    store: fn(&mut PendingAssets, Shared<T>),
}

impl<T> LoadSlot<T> {
    /// Deliver the load result. Returns `true` if the asset was accepted.
    ///
    /// A failure is logged here and kept for [`FrameUpdater::take_load_error`];
    /// the updater stays idle.
    pub fn complete(self, result: std::result::Result<Shared<T>, AssetLoadError>) -> bool {
        let Some(pending) = self.pending.upgrade() else {
            debug!("{} finished loading after its updater went away, ignored", self.kind);
            return false;
        };
        let mut pending = pending.borrow_mut();
        match result {
            Ok(asset) => {
                (self.store)(&mut pending, asset);
                pending.generation += 1;
                info!("{} loaded", self.kind);
                true
            }
            Err(err) => {
                error!("failed to load {}: {err}", self.kind);
                pending.failure.get_or_insert(err);
                false
            }
        }
    }
}

impl<T> std::fmt::Debug for LoadSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadSlot").field("kind", &self.kind).finish()
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////////

/// Drives a target rig from a source clip once per frame.
#[derive(Debug)]
pub struct FrameUpdater {
    config: RetargetConfig,
    pending: Rc<RefCell<PendingAssets>>,
    /// Built but not yet bound.
    correspondence: Option<RetargetBinding>,
    /// Asset generation the correspondence was built against.
    built_for: u64,
    phase: Phase,
    /// Automatic binding already failed once; only an explicit call retries.
    auto_bind_failed: bool,
}

impl FrameUpdater {
    pub fn new(config: RetargetConfig) -> Self {
        FrameUpdater {
            config,
            pending: Rc::new(RefCell::new(PendingAssets::default())),
            correspondence: None,
            built_for: 0,
            phase: Phase::Idle,
            auto_bind_failed: false,
        }
    }

    /// An updater whose assets are already loaded.
    pub fn with_assets(config: RetargetConfig, rig: Shared<HumanoidRig>, motion: Shared<MotionClip>) -> Self {
        let updater = Self::new(config);
        {
            let mut pending = updater.pending.borrow_mut();
            pending.rig = Some(rig);
            pending.motion = Some(motion);
            pending.generation += 2;
        }
        updater
    }

    pub fn rig_slot(&self) -> LoadSlot<HumanoidRig> {
        LoadSlot {
            kind: "humanoid rig",
            pending: Rc::downgrade(&self.pending),
            store: |pending, rig| pending.rig = Some(rig),
        }
    }

    pub fn motion_slot(&self) -> LoadSlot<MotionClip> {
        LoadSlot {
            kind: "motion clip",
            pending: Rc::downgrade(&self.pending),
            store: |pending, motion| pending.motion = Some(motion),
        }
    }

    pub fn state(&self) -> UpdaterState {
        match self.phase {
            Phase::Idle => UpdaterState::Idle,
            Phase::Bound(_) => UpdaterState::Bound,
            Phase::Stopped => UpdaterState::Stopped,
        }
    }

    pub fn config(&self) -> &RetargetConfig {
        &self.config
    }

    /// The active binding, or the correspondence waiting to be bound.
    pub fn binding(&self) -> Option<&RetargetBinding> {
        match &self.phase {
            Phase::Bound(bound) => Some(bound.binding()),
            _ => self.fresh_correspondence(),
        }
    }

    pub fn target(&self) -> Option<Shared<HumanoidRig>> {
        self.pending.borrow().rig.clone()
    }

    pub fn source(&self) -> Option<Shared<MotionClip>> {
        self.pending.borrow().motion.clone()
    }

    /// The first load failure reported through a slot, if any.
    pub fn take_load_error(&mut self) -> Option<RetargetError> {
        self.pending.borrow_mut().failure.take().map(RetargetError::AssetLoad)
    }

    fn assets(&self) -> Result<(Shared<HumanoidRig>, Shared<MotionClip>)> {
        let pending = self.pending.borrow();
        let rig = pending.rig.clone().ok_or(RetargetError::AssetsPending("humanoid rig"))?;
        let motion = pending.motion.clone().ok_or(RetargetError::AssetsPending("motion clip"))?;
        Ok((rig, motion))
    }

    fn generation(&self) -> u64 {
        self.pending.borrow().generation
    }

    /// The built correspondence, unless an asset was delivered since it was built.
    fn fresh_correspondence(&self) -> Option<&RetargetBinding> {
        self.correspondence.as_ref().filter(|_| self.built_for == self.generation())
    }

    /// Match the loaded rig against the loaded clip. The result waits for [`FrameUpdater::bind`].
    pub fn build_correspondence(&mut self) -> Result<&RetargetBinding> {
        if let Phase::Stopped = self.phase {
            return Err(RetargetError::Stopped);
        }
        let (rig, motion) = self.assets()?;
        let binding = {
            let rig = rig.try_borrow().map_err(|_| RetargetError::AssetBusy("humanoid rig"))?;
            let motion = motion.try_borrow().map_err(|_| RetargetError::AssetBusy("motion clip"))?;
            mapper::build_correspondence(&rig, &*motion, &self.config.mapping)?
        };
        self.built_for = self.generation();
        Ok(self.correspondence.insert(binding))
    }

    /// Bind the built correspondence. Replaces any earlier binding.
    ///
    /// A correspondence built before the latest asset delivery indexes bones of
    /// the old skeletons, so it is dropped and [`RetargetError::UnboundSlot`] returned.
    pub fn bind(&mut self) -> Result<()> {
        if let Phase::Stopped = self.phase {
            return Err(RetargetError::Stopped);
        }
        let (rig, motion) = self.assets()?;
        let binding = self.correspondence.take().ok_or(RetargetError::UnboundSlot)?;
        if self.built_for != self.generation() {
            debug!("correspondence predates the latest asset delivery, dropped");
            return Err(RetargetError::UnboundSlot);
        }
        let bound = binder::bind(binding, &rig, &motion, self.config.root_motion)?;
        self.phase = Phase::Bound(bound);
        Ok(())
    }

    /// Throw the current binding away, put the target back at rest and bind from scratch.
    pub fn rebind(&mut self) -> Result<()> {
        if let Phase::Stopped = self.phase {
            return Err(RetargetError::Stopped);
        }
        self.release();
        self.auto_bind_failed = false;
        self.build_and_bind()
    }

    fn build_and_bind(&mut self) -> Result<()> {
        if self.fresh_correspondence().is_none() {
            self.build_correspondence()?;
        }
        self.bind()
    }

    /// Tear down. Terminal: every later call reports [`RetargetError::Stopped`]
    /// and outstanding load slots become no-ops.
    pub fn stop(&mut self) {
        if let Phase::Stopped = self.phase {
            return;
        }
        self.correspondence = None;
        self.phase = Phase::Stopped;
        self.pending = Rc::new(RefCell::new(PendingAssets::default()));
        info!("frame updater stopped");
    }

    fn release(&mut self) {
        self.correspondence = None;
        if let Phase::Bound(bound) = std::mem::replace(&mut self.phase, Phase::Idle) {
            if let Some(target) = bound.target() {
                if let Ok(mut rig) = target.try_borrow_mut() {
                    rig.skeleton_mut().reset_to_rest();
                }
            }
        }
    }

    /// Bind on the first tick that sees both assets.
    fn try_auto_bind(&mut self) -> bool {
        if self.auto_bind_failed || self.assets().is_err() {
            return false;
        }
        match self.build_and_bind() {
            Ok(()) => true,
            Err(err) => {
                error!("automatic binding failed: {err}");
                self.auto_bind_failed = true;
                false
            }
        }
    }

    /// Advance by `delta` seconds (scaled by the playback speed) and drive the target.
    pub fn tick(&mut self, delta: f64) -> TickOutcome {
        if let Phase::Stopped = self.phase {
            return TickOutcome::Stopped;
        }
        if !delta.is_finite() || delta <= 0.0 {
            return TickOutcome::Skipped;
        }
        if let Phase::Idle = self.phase {
            if !self.try_auto_bind() {
                return TickOutcome::Idle;
            }
        }

        let speed = self.config.playback.speed;
        let loop_mode = self.config.playback.loop_mode;
        let Phase::Bound(bound) = &mut self.phase else {
            return TickOutcome::Idle;
        };
        match bound.step(delta * speed, loop_mode) {
            Some(driven) => TickOutcome::Driven {
                driven,
                time: bound.binding().clock().elapsed(),
            },
            None => TickOutcome::Skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanoid::HumanoidSlot;
    use crate::skeleton::Skeleton;
    use crate::types::{Position, Quaternion, Transform};
    use crate::utils;
    use cgmath::{Deg, Rotation3};

    fn at(y: f64) -> Transform {
        Transform {
            scale: 1.0,
            rot: utils::identity_rotation(),
            disp: Position::new(0.0, y, 0.0),
        }
    }

    fn rig(slots: bool) -> Shared<HumanoidRig> {
        let mut b = Skeleton::builder();
        let hips = b.add_bone("J_Bip_C_Hips", None, at(1.0)).unwrap();
        b.add_bone("J_Bip_C_Spine", Some(hips), at(0.1)).unwrap();
        let mut rig = HumanoidRig::new(b.build().unwrap());
        if slots {
            rig.assign(HumanoidSlot::Hips, hips).unwrap();
        }
        Rc::new(RefCell::new(rig))
    }

    fn clip() -> Shared<MotionClip> {
        let mut b = Skeleton::builder();
        b.add_bone("mixamorig:Hips", None, at(0.0)).unwrap();
        let track = vec![Quaternion::from_angle_y(Deg(0.0)), Quaternion::from_angle_y(Deg(60.0))];
        let clip = MotionClip::new(b.build().unwrap(), 0.5, vec![track], Vec::new()).unwrap();
        Rc::new(RefCell::new(clip))
    }

    #[test]
    fn binds_automatically_once_both_assets_arrive() {
        let mut updater = FrameUpdater::new(RetargetConfig::default());
        assert_eq!(updater.tick(0.016), TickOutcome::Idle);

        assert!(updater.rig_slot().complete(Ok(rig(true))));
        assert_eq!(updater.tick(0.016), TickOutcome::Idle);
        assert_eq!(updater.state(), UpdaterState::Idle);

        assert!(updater.motion_slot().complete(Ok(clip())));
        assert!(matches!(updater.tick(0.25), TickOutcome::Driven { driven: 1, .. }));
        assert_eq!(updater.state(), UpdaterState::Bound);
    }

    #[test]
    fn explicit_steps_report_their_preconditions() {
        let mut updater = FrameUpdater::new(RetargetConfig::default());
        assert!(matches!(updater.build_correspondence(), Err(RetargetError::AssetsPending(_))));

        updater.rig_slot().complete(Ok(rig(true)));
        updater.motion_slot().complete(Ok(clip()));
        assert!(matches!(updater.bind(), Err(RetargetError::UnboundSlot)));

        assert_eq!(updater.build_correspondence().unwrap().len(), 1);
        updater.bind().unwrap();
        assert_eq!(updater.state(), UpdaterState::Bound);
    }

    #[test]
    fn correspondence_is_rebuilt_after_a_new_rig_arrives() {
        let mut updater = FrameUpdater::new(RetargetConfig::default());
        updater.rig_slot().complete(Ok(rig(true)));
        updater.motion_slot().complete(Ok(clip()));
        assert_eq!(updater.build_correspondence().unwrap().entries()[0].target, 0);

        // a second rig with an extra root bone above the hips
        let mut b = Skeleton::builder();
        let root = b.add_bone("B_Root", None, at(0.0)).unwrap();
        let hips = b.add_bone("B_Hips", Some(root), at(1.0)).unwrap();
        let spine = b.add_bone("B_Spine", Some(hips), at(0.1)).unwrap();
        let mut second = HumanoidRig::new(b.build().unwrap());
        second.assign(HumanoidSlot::Hips, hips).unwrap();
        second.assign(HumanoidSlot::Spine, spine).unwrap();
        let second = Rc::new(RefCell::new(second));
        assert!(updater.rig_slot().complete(Ok(second.clone())));

        assert!(updater.binding().is_none());
        assert!(matches!(updater.bind(), Err(RetargetError::UnboundSlot)));

        assert!(matches!(updater.tick(0.25), TickOutcome::Driven { driven: 1, .. }));
        assert_eq!(updater.binding().unwrap().entries()[0].target, hips);
        let rig = second.borrow();
        let root = rig.skeleton().root();
        assert_eq!(root.local.rot, root.rest.rot);
        let driven = &rig.skeleton().bones()[hips];
        assert!(!utils::same_rotation(driven.local.rot, driven.rest.rot, 1e-6));
    }

    #[test]
    fn rig_without_slots_stays_idle() {
        let mut updater = FrameUpdater::with_assets(RetargetConfig::default(), rig(false), clip());
        assert!(matches!(updater.build_correspondence(), Err(RetargetError::MissingHumanoidData)));
        assert_eq!(updater.tick(0.016), TickOutcome::Idle);
        assert_eq!(updater.tick(0.016), TickOutcome::Idle);
    }

    #[test]
    fn load_failure_is_kept_and_updater_stays_idle() {
        let mut updater = FrameUpdater::new(RetargetConfig::default());
        let failed = updater
            .motion_slot()
            .complete(Err(AssetLoadError::parse(3, "expected OFFSET")));
        assert!(!failed);
        updater.rig_slot().complete(Ok(rig(true)));

        assert_eq!(updater.tick(0.016), TickOutcome::Idle);
        let err = updater.take_load_error().unwrap();
        assert!(matches!(err, RetargetError::AssetLoad(AssetLoadError::Parse { line: 3, .. })));
        assert!(updater.take_load_error().is_none());
    }

    #[test]
    fn late_completion_after_drop_or_stop_is_a_no_op() {
        let updater = FrameUpdater::new(RetargetConfig::default());
        let slot = updater.rig_slot();
        drop(updater);
        assert!(!slot.complete(Ok(rig(true))));

        let mut updater = FrameUpdater::new(RetargetConfig::default());
        let slot = updater.motion_slot();
        updater.stop();
        assert!(!slot.complete(Ok(clip())));
        assert!(updater.source().is_none());
    }

    #[test]
    fn stopped_is_terminal() {
        let mut updater = FrameUpdater::with_assets(RetargetConfig::default(), rig(true), clip());
        assert!(matches!(updater.tick(0.1), TickOutcome::Driven { .. }));
        updater.stop();
        assert_eq!(updater.state(), UpdaterState::Stopped);
        assert_eq!(updater.tick(0.1), TickOutcome::Stopped);
        assert!(matches!(updater.rebind(), Err(RetargetError::Stopped)));
        assert!(matches!(updater.bind(), Err(RetargetError::Stopped)));
        assert!(updater.binding().is_none());
    }

    #[test]
    fn non_positive_delta_is_skipped_and_speed_scales_time() {
        let mut config = RetargetConfig::default();
        config.playback.speed = 2.0;
        let mut updater = FrameUpdater::with_assets(config, rig(true), clip());

        assert_eq!(updater.tick(0.0), TickOutcome::Skipped);
        assert_eq!(updater.tick(-0.5), TickOutcome::Skipped);
        assert_eq!(updater.state(), UpdaterState::Idle);

        assert_eq!(updater.tick(0.125), TickOutcome::Driven { driven: 1, time: 0.25 });
        assert_eq!(updater.tick(f64::INFINITY), TickOutcome::Skipped);
        assert_eq!(updater.binding().unwrap().clock().elapsed(), 0.25);
    }
}
