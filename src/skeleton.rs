use crate::error::{Result, RetargetError};
use crate::types::{Bone, Index, Transform};
use crate::utils;
use cgmath::{Matrix4, SquareMatrix};

/////////////////////////////////////////////////////////////////////////////////////////////////

/// A rigid bone hierarchy stored as a flat collection.
///
/// Bones are kept in insertion order and a bone's parent is always inserted
/// before the bone itself, so iterating [`Skeleton::bones`] visits parents
/// before children and the hierarchy can't contain a cycle. There is exactly
/// one root.
#[derive(Debug, Clone)]
pub struct Skeleton {
    bones: Vec<Bone>,
    root: Index,
    pose_dirty: bool,
    skinning: Vec<Matrix4<f64>>,
}

impl Skeleton {
    pub fn builder() -> SkeletonBuilder {
        SkeletonBuilder::default()
    }

    pub fn root(&self) -> &Bone {
        &self.bones[self.root]
    }

    /// All bones, parents before children.
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone(&self, index: Index) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Overwrite the local transform of a bone. World transforms are stale until
    /// [`Skeleton::update_world_transforms`] runs.
    pub fn set_local(&mut self, index: Index, local: Transform) -> bool {
        match self.bones.get_mut(index) {
            Some(bone) => {
                bone.local = local;
                true
            }
            None => false,
        }
    }

    /// Forward kinematics over the whole hierarchy.
    pub fn update_world_transforms(&mut self) {
        for i in 0..self.bones.len() {
            self.refresh_world(i);
        }
    }

    /// Recompute one bone's world transform from its local transform and its parent's current world transform.
    pub fn refresh_world(&mut self, index: Index) {
        let Some(bone) = self.bones.get(index) else {
            return;
        };
        let world = match bone.parent {
            Some(p) => utils::compose(&self.bones[p].world, &bone.local),
            None => bone.local,
        };
        self.bones[index].world = world;
    }

    /// Put every bone back into its rest pose.
    pub fn reset_to_rest(&mut self) {
        for bone in self.bones.iter_mut() {
            bone.local = bone.rest;
            bone.world = bone.rest_world;
        }
        self.pose_dirty = true;
    }

    /// Flag the pose as changed so the skinning matrices get recomputed before the next draw.
    pub fn mark_dirty(&mut self) {
        self.pose_dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.pose_dirty
    }

    /// Per bone `world * inverse(rest_world)`, recomputed only if the pose changed since the last call.
    pub fn skinning_matrices(&mut self) -> &[Matrix4<f64>] {
        if self.pose_dirty {
            for (matrix, bone) in self.skinning.iter_mut().zip(self.bones.iter()) {
                let inverse_bind = utils::invert(&bone.rest_world);
                *matrix = utils::to_matrix(&utils::compose(&bone.world, &inverse_bind));
            }
            self.pose_dirty = false;
        }
        &self.skinning
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////////

/// Incrementally assembles a [`Skeleton`]. The first bone without parent becomes the root.
#[derive(Debug, Default)]
pub struct SkeletonBuilder {
    bones: Vec<Bone>,
    root: Option<Index>,
}

impl SkeletonBuilder {
    /// Append a bone. `parent` must refer to a bone added earlier.
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: Option<Index>,
        rest: Transform,
    ) -> Result<Index> {
        let name = name.into();
        let index = self.bones.len();

        let depth = match parent {
            Some(p) => match self.bones.get_mut(p) {
                Some(parent_bone) => {
                    parent_bone.children.push(index);
                    parent_bone.depth + 1
                }
                None => {
                    return Err(RetargetError::InvalidSkeleton(format!(
                        "bone '{name}' references parent {p} which does not exist yet"
                    )))
                }
            },
            None => {
                if let Some(root) = self.root {
                    return Err(RetargetError::InvalidSkeleton(format!(
                        "bone '{name}' would be a second root (root is '{}')",
                        self.bones[root].name
                    )));
                }
                self.root = Some(index);
                0
            }
        };

        self.bones.push(Bone {
            name,
            index,
            parent,
            children: Vec::new(),
            depth,
            rest,
            rest_world: rest,
            local: rest,
            world: rest,
        });
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn build(self) -> Result<Skeleton> {
        let root = self
            .root
            .ok_or_else(|| RetargetError::InvalidSkeleton("skeleton has no bones".to_string()))?;
        let mut bones = self.bones;

        //// rest pose in world space, parents are always computed first
        for i in 0..bones.len() {
            if let Some(p) = bones[i].parent {
                bones[i].rest_world = utils::compose(&bones[p].rest_world, &bones[i].rest);
            }
            bones[i].world = bones[i].rest_world;
        }

        let skinning = vec![Matrix4::identity(); bones.len()];
        Ok(Skeleton {
            bones,
            root,
            pose_dirty: false,
            skinning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Position, Quaternion};
    use crate::utils::same_rotation;
    use cgmath::{Deg, InnerSpace, Rotation3};

    fn offset(x: f64, y: f64, z: f64) -> Transform {
        Transform {
            scale: 1.0,
            rot: utils::identity_rotation(),
            disp: Position::new(x, y, z),
        }
    }

    #[test]
    fn rest_world_composes_down_the_chain() {
        let mut b = Skeleton::builder();
        let hips = b
            .add_bone(
                "Hips",
                None,
                Transform {
                    scale: 1.0,
                    rot: Quaternion::from_angle_y(Deg(90.0)),
                    disp: Position::new(0.0, 1.0, 0.0),
                },
            )
            .unwrap();
        let spine = b.add_bone("Spine", Some(hips), offset(0.0, 0.0, 1.0)).unwrap();
        let skeleton = b.build().unwrap();

        let spine = skeleton.bone(spine).unwrap();
        // +Z rotated 90 degrees about Y ends up on +X
        assert!((spine.rest_world.disp - Position::new(1.0, 1.0, 0.0)).magnitude() < 1e-9);
        assert!(same_rotation(spine.rest_world.rot, Quaternion::from_angle_y(Deg(90.0)), 1e-9));
        assert_eq!(spine.depth, 1);
        assert_eq!(skeleton.root().children, vec![spine.index]);
    }

    #[test]
    fn second_root_is_rejected() {
        let mut b = Skeleton::builder();
        b.add_bone("Hips", None, offset(0.0, 0.0, 0.0)).unwrap();
        assert!(matches!(
            b.add_bone("Other", None, offset(0.0, 0.0, 0.0)),
            Err(RetargetError::InvalidSkeleton(_))
        ));
    }

    #[test]
    fn forward_parent_reference_is_rejected() {
        let mut b = Skeleton::builder();
        assert!(b.add_bone("Spine", Some(3), offset(0.0, 0.0, 0.0)).is_err());
        assert!(Skeleton::builder().build().is_err());
    }

    #[test]
    fn skinning_is_identity_at_rest_and_cached_until_dirty() {
        let mut b = Skeleton::builder();
        let hips = b.add_bone("Hips", None, offset(0.0, 1.0, 0.0)).unwrap();
        b.add_bone("Spine", Some(hips), offset(0.0, 0.5, 0.0)).unwrap();
        let mut skeleton = b.build().unwrap();

        skeleton.mark_dirty();
        for m in skeleton.skinning_matrices() {
            assert!((*m - Matrix4::identity()).x.magnitude() < 1e-9);
            assert!((*m - Matrix4::identity()).w.magnitude() < 1e-9);
        }
        assert!(!skeleton.is_dirty());

        let mut local = skeleton.bone(hips).unwrap().local;
        local.disp = Position::new(0.0, 2.0, 0.0);
        skeleton.set_local(hips, local);
        skeleton.update_world_transforms();
        skeleton.mark_dirty();
        let m = skeleton.skinning_matrices()[1];
        assert!((m.w.y - 1.0).abs() < 1e-9);
    }
}
