//! Retarget motion capture clips onto humanoid avatar rigs.
//!
//! A [`MotionClip`] (usually loaded from .bvh) drives a [`HumanoidRig`] whose
//! bones are labeled with [`HumanoidSlot`]s. Bones are paired by normalized
//! name, each pair carries a rest pose correction, and a [`FrameUpdater`]
//! rewrites the rig's pose once per frame.
//!
//! ```no_run
//! use mocap_retarget::{parse, rig_file, FrameUpdater, RetargetConfig};
//! use std::{cell::RefCell, rc::Rc};
//!
//! let mut updater = FrameUpdater::new(RetargetConfig::default());
//! updater.rig_slot().complete(rig_file::load_rig_from_file("avatar.json").map(|r| Rc::new(RefCell::new(r))));
//! updater.motion_slot().complete(parse::load_bvh_from_file("walk.bvh").map(|c| Rc::new(RefCell::new(c))));
//! updater.tick(1.0 / 60.0);
//! ```

pub mod adapter;
pub mod binder;
pub mod clip;
pub mod config;
pub mod error;
pub mod humanoid;
pub mod mapper;
pub mod parse;
pub mod registry;
pub mod rig_file;
pub mod skeleton;
pub mod types;
pub mod updater;
pub mod utils;
#[cfg(feature = "visualize")]
pub mod visualize;

pub use adapter::SkeletonAdapter;
pub use binder::{bind, BoundRig};
pub use clip::{AnimationClock, AnimationPlayback, MotionClip};
pub use config::{LoopMode, MappingConfig, PlaybackConfig, RetargetConfig, RootMotion};
pub use error::{AssetLoadError, ConfigError, Result, RetargetError};
pub use humanoid::{HumanoidRig, HumanoidSlot};
pub use mapper::{build_correspondence, CorrespondenceEntry, RetargetBinding};
pub use skeleton::{Skeleton, SkeletonBuilder};
pub use types::{Bone, Shared};
pub use updater::{FrameUpdater, LoadSlot, TickOutcome, UpdaterState};
