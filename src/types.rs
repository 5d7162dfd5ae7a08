use cgmath::{Decomposed, Quaternion as CgQuaternion, Vector3};
use std::cell::RefCell;
use std::rc::Rc;

/////////////////////////////////////////////////////////////////////////////////////////////////

pub type Index = usize;
pub type Quaternion = CgQuaternion<f64>;
pub type Position = Vector3<f64>;
/// Translation + rotation + uniform scale of a bone.
pub type Transform = Decomposed<Position, Quaternion>;

/// Asset handle shared between a loader (owner) and the render layer.
/// Retargeting components only keep `Weak` handles to it.
pub type Shared<T> = Rc<RefCell<T>>;

/////////////////////////////////////////////////////////////////////////////////////////////////

/// One joint of a skeleton.
///
/// Bones live in the flat collection of their [`Skeleton`](crate::skeleton::Skeleton);
/// `parent` and `children` are indices into that collection, so the back
/// reference to the parent never owns anything.
#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    pub index: Index,
    pub parent: Option<Index>,
    pub children: Vec<Index>,
    pub depth: usize,

    /// Local transform of the undriven skeleton.
    pub rest: Transform,
    /// Rest pose composed up to the root.
    pub rest_world: Transform,

    /// Current local transform (written by playback or by the pose binder).
    pub local: Transform,
    /// Current world transform, derived from `local` and the parent's `world`.
    pub world: Transform,
}

impl Bone {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////////

/// Axis named by a bvh channel (`Xrotation`, `Zposition`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn from_channel_prefix(c: char) -> Option<Axis> {
        match c {
            'X' | 'x' => Some(Axis::X),
            'Y' | 'y' => Some(Axis::Y),
            'Z' | 'z' => Some(Axis::Z),
            _ => None,
        }
    }
}
