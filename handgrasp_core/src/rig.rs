//! Joint storage for a hand skeleton.
//!
//! `Skeleton` is a flat arena of joint nodes. It implements
//! `JointTransforms`, so the blender can drive it directly; engine
//! integrations provide their own implementation of the trait instead.

use crate::digit::{Digit, DigitMap};
use crate::finger_curl::JointChain;
use handgrasp_env::{EnvError, JointId, JointTransforms};
use nalgebra::{UnitQuaternion, Vector3};

/// A single joint node.
#[derive(Debug, Clone)]
pub struct JointNode {
    /// Human-readable name (e.g. "index_proximal")
    pub name: String,

    /// Parent joint, if any
    pub parent: Option<JointId>,

    /// Rotation relative to the parent
    pub local_rotation: UnitQuaternion<f64>,
}

/// Arena of joints addressed by `JointId`.
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    joints: Vec<JointNode>,
}

impl Skeleton {
    /// Creates an empty skeleton.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a joint and returns its id.
    pub fn add_joint(
        &mut self,
        name: &str,
        parent: Option<JointId>,
        local_rotation: UnitQuaternion<f64>,
    ) -> Result<JointId, EnvError> {
        if let Some(parent) = parent {
            if self.joint(parent).is_none() {
                return Err(EnvError::UnknownJoint(parent));
            }
        }

        let id = JointId(self.joints.len() as u32);
        self.joints.push(JointNode {
            name: name.to_string(),
            parent,
            local_rotation,
        });
        Ok(id)
    }

    /// Returns a joint by id.
    pub fn joint(&self, id: JointId) -> Option<&JointNode> {
        self.joints.get(id.0 as usize)
    }

    /// Finds a joint by name.
    pub fn find(&self, name: &str) -> Option<JointId> {
        self.joints
            .iter()
            .position(|j| j.name == name)
            .map(|i| JointId(i as u32))
    }

    /// Number of joints.
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Builds a wrist plus three joints per digit.
    ///
    /// Digits fan out slightly around the wrist's Y axis so that no bind
    /// rotation is the identity, which makes bind-relative application
    /// observable.
    pub fn standard_hand() -> (Skeleton, DigitMap<JointChain>) {
        let mut skeleton = Skeleton::new();
        let wrist = skeleton.push("wrist", None, UnitQuaternion::identity());

        let chains = DigitMap::from_fn(|digit| {
            let spread = (digit.index() as f64 - 2.0) * 0.12;
            let root = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), spread);
            let rest = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.05);

            let proximal = skeleton.push(&format!("{digit}_proximal"), Some(wrist), root);
            let intermediate = skeleton.push(&format!("{digit}_intermediate"), Some(proximal), rest);
            let distal = skeleton.push(&format!("{digit}_distal"), Some(intermediate), rest);

            JointChain::new(Some(proximal), Some(intermediate), Some(distal))
        });

        (skeleton, chains)
    }

    /// Same as `standard_hand` but the given digits get no joints at all.
    pub fn partial_hand(missing: &[Digit]) -> (Skeleton, DigitMap<JointChain>) {
        let (skeleton, mut chains) = Self::standard_hand();
        for digit in missing {
            chains[*digit] = JointChain::default();
        }
        (skeleton, chains)
    }

    // Parent ids passed here always come from this arena.
    fn push(&mut self, name: &str, parent: Option<JointId>, rot: UnitQuaternion<f64>) -> JointId {
        let id = JointId(self.joints.len() as u32);
        self.joints.push(JointNode {
            name: name.to_string(),
            parent,
            local_rotation: rot,
        });
        id
    }
}

impl JointTransforms for Skeleton {
    fn local_rotation(&self, joint: JointId) -> Option<UnitQuaternion<f64>> {
        self.joint(joint).map(|j| j.local_rotation)
    }

    fn set_local_rotation(&mut self, joint: JointId, rotation: UnitQuaternion<f64>) {
        if let Some(node) = self.joints.get_mut(joint.0 as usize) {
            node.local_rotation = rotation;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_hand_layout() {
        let (skeleton, chains) = Skeleton::standard_hand();
        assert_eq!(skeleton.len(), 1 + 5 * 3);

        let index = chains[Digit::Index];
        assert_eq!(index.len(), 3);
        assert_eq!(skeleton.find("index_proximal"), index.proximal);
        assert_eq!(skeleton.joint(index.distal.unwrap()).unwrap().parent, index.intermediate);
    }

    #[test]
    fn test_add_joint_rejects_unknown_parent() {
        let mut skeleton = Skeleton::new();
        let err = skeleton
            .add_joint("orphan", Some(JointId(9)), UnitQuaternion::identity())
            .unwrap_err();
        assert!(matches!(err, EnvError::UnknownJoint(JointId(9))));
    }

    #[test]
    fn test_unknown_joint_write_is_ignored() {
        let mut skeleton = Skeleton::new();
        skeleton.set_local_rotation(JointId(3), UnitQuaternion::identity());
        assert!(skeleton.local_rotation(JointId(3)).is_none());
    }

    #[test]
    fn test_partial_hand_drops_chains() {
        let (_, chains) = Skeleton::partial_hand(&[Digit::Thumb]);
        assert_eq!(chains[Digit::Thumb].len(), 0);
        assert_eq!(chains[Digit::Little].len(), 3);
    }
}
