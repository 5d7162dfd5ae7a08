//! One query interface over both kinds of skeleton the retargeting core sees:
//! the imported motion capture skeleton ([`MotionClip`]) and the labeled
//! avatar skeleton ([`HumanoidRig`]).

use crate::clip::MotionClip;
use crate::humanoid::HumanoidRig;
use crate::registry;
use crate::skeleton::Skeleton;
use crate::types::Bone;

pub trait SkeletonAdapter {
    fn skeleton(&self) -> &Skeleton;

    fn root(&self) -> &Bone {
        self.skeleton().root()
    }

    /// Stable order, parents before children.
    fn bones(&self) -> &[Bone] {
        self.skeleton().bones()
    }

    /// Registry lookup: the first bone whose normalized name matches `name` normalized.
    fn find_by_name(&self, name: &str) -> Option<&Bone> {
        registry::lookup(self.skeleton(), &registry::normalize(name))
    }
}

impl SkeletonAdapter for Skeleton {
    fn skeleton(&self) -> &Skeleton {
        self
    }
}

impl SkeletonAdapter for HumanoidRig {
    fn skeleton(&self) -> &Skeleton {
        HumanoidRig::skeleton(self)
    }
}

impl SkeletonAdapter for MotionClip {
    fn skeleton(&self) -> &Skeleton {
        MotionClip::skeleton(self)
    }
}
