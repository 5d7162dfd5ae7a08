use crate::config::LoopMode;
use crate::error::AssetLoadError;
use crate::skeleton::Skeleton;
use crate::types::{Index, Position, Quaternion, Transform};
use crate::utils;
use cgmath::{InnerSpace, VectorSpace};

/////////////////////////////////////////////////////////////////////////////////////////////////

/// Seconds of animation time elapsed since binding.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnimationClock {
    elapsed: f64,
}

impl AnimationClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Move time forward. Zero, negative and non-finite deltas are refused (returns `false`).
    pub fn advance(&mut self, delta: f64) -> bool {
        if !delta.is_finite() || delta <= 0.0 {
            return false;
        }
        self.elapsed += delta;
        true
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }

    /// Map the elapsed time into `[0, duration]` of a clip.
    pub fn clip_time(&self, duration: f64, mode: LoopMode) -> f64 {
        if duration <= 0.0 {
            return 0.0;
        }
        match mode {
            LoopMode::Loop => self.elapsed.rem_euclid(duration),
            LoopMode::Once => self.elapsed.min(duration),
        }
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////////

/// The animation playback collaborator: poses a clip's own skeleton for a point in time.
pub trait AnimationPlayback {
    /// Length in seconds.
    fn duration(&self) -> f64;

    /// Write the pose at `time` into the clip skeleton's local transforms and refresh its world transforms.
    fn sample(&mut self, time: f64, mode: LoopMode);
}

/// A motion capture skeleton together with its time-sampled joint rotations.
#[derive(Debug, Clone)]
pub struct MotionClip {
    skeleton: Skeleton,
    frame_time: f64,
    num_frames: usize,
    /// `local_rotations[bone][frame]`
    local_rotations: Vec<Vec<Quaternion>>,
    /// Root translation per frame. Empty when the root has no position channels.
    root_positions: Vec<Position>,
}

impl MotionClip {
    pub fn new(
        skeleton: Skeleton,
        frame_time: f64,
        local_rotations: Vec<Vec<Quaternion>>,
        root_positions: Vec<Position>,
    ) -> Result<Self, AssetLoadError> {
        if !frame_time.is_finite() || frame_time <= 0.0 {
            return Err(AssetLoadError::Skeleton(format!(
                "frame time must be positive, got {frame_time}"
            )));
        }
        if local_rotations.len() != skeleton.len() {
            return Err(AssetLoadError::Skeleton(format!(
                "{} rotation tracks for {} bones",
                local_rotations.len(),
                skeleton.len()
            )));
        }
        let num_frames = local_rotations.first().map_or(0, Vec::len);
        if let Some(track) = local_rotations.iter().position(|t| t.len() != num_frames) {
            return Err(AssetLoadError::Skeleton(format!(
                "track of bone '{}' has {} frames, expected {num_frames}",
                skeleton.bones()[track].name,
                local_rotations[track].len()
            )));
        }
        if !root_positions.is_empty() && root_positions.len() != num_frames {
            return Err(AssetLoadError::Skeleton(format!(
                "{} root positions for {num_frames} frames",
                root_positions.len()
            )));
        }

        Ok(MotionClip {
            skeleton,
            frame_time,
            num_frames,
            local_rotations,
            root_positions,
        })
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn frame_time(&self) -> f64 {
        self.frame_time
    }

    /// Rounded frame rate, for display.
    pub fn fps(&self) -> u32 {
        (1.0 / self.frame_time).round() as u32
    }

    /// Exact frames per second. Unlike [`MotionClip::fps`] this never rounds down to zero.
    pub fn frame_rate(&self) -> f64 {
        1.0 / self.frame_time
    }

    /// Local transform of `bone` as authored in `frame`, without interpolation.
    fn frame_local(&self, bone: Index, frame: usize) -> Option<Transform> {
        let rest = self.skeleton.bone(bone)?.rest;
        let rot = self.local_rotation(bone, frame).unwrap_or(rest.rot);
        let disp = match self.root_positions.get(frame) {
            Some(&position) if bone == self.skeleton.root().index => position,
            _ => rest.disp,
        };
        Some(Transform {
            scale: rest.scale,
            rot,
            disp,
        })
    }

    /// World transform of `bone` in the first frame, the pose the clip starts from.
    /// Clips without frames report the rest pose.
    pub fn reference_world(&self, bone: Index) -> Option<Transform> {
        let local = self.frame_local(bone, 0)?;
        match self.skeleton.bone(bone)?.parent {
            Some(parent) => Some(utils::compose(&self.reference_world(parent)?, &local)),
            None => Some(local),
        }
    }

    pub fn local_rotation(&self, bone: Index, frame: usize) -> Option<Quaternion> {
        self.local_rotations.get(bone)?.get(frame).copied()
    }

    /// Neighbouring frames and the blend weight between them for `time`.
    fn frames_at(&self, time: f64, mode: LoopMode) -> (usize, usize, f64) {
        let last = self.num_frames - 1;
        let f = (time / self.frame_time).max(0.0);
        let i0 = f.floor() as usize;
        let alpha = f - f.floor();
        match mode {
            LoopMode::Loop => {
                let i0 = i0 % self.num_frames;
                (i0, (i0 + 1) % self.num_frames, alpha)
            }
            LoopMode::Once if i0 >= last => (last, last, 0.0),
            LoopMode::Once => (i0, i0 + 1, alpha),
        }
    }
}

impl AnimationPlayback for MotionClip {
    fn duration(&self) -> f64 {
        self.num_frames as f64 * self.frame_time
    }

    fn sample(&mut self, time: f64, mode: LoopMode) {
        if self.num_frames == 0 {
            return;
        }
        let (i0, i1, alpha) = self.frames_at(time, mode);

        for index in 0..self.skeleton.len() {
            let track = &self.local_rotations[index];
            let a = track[i0];
            // take the short way round
            let b = if a.dot(track[i1]) < 0.0 { -track[i1] } else { track[i1] };
            let rot = utils::normalize_rotation(a.slerp(b, alpha));

            let rest = self.skeleton.bones()[index].rest;
            let disp = if index == self.skeleton.root().index && !self.root_positions.is_empty() {
                self.root_positions[i0].lerp(self.root_positions[i1], alpha)
            } else {
                rest.disp
            };
            self.skeleton.set_local(
                index,
                Transform {
                    scale: rest.scale,
                    rot,
                    disp,
                },
            );
        }
        self.skeleton.update_world_transforms();
    }
}
