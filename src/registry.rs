//! Canonical bone keys.
//!
//! Source and target assets spell the same joint differently ("LeftUpperArm",
//! "left_upper_arm", "mixamorig:LeftUpperArm"). [`normalize`] maps all of those
//! onto one [`BoneKey`]:
//!
//! 1. everything up to and including the last `:` or `|` is dropped (namespace prefix),
//! 2. the remainder is lowercased with Unicode's locale independent mapping,
//! 3. every character that is not alphanumeric is dropped.
//!
//! The output contains neither separators nor punctuation, so normalizing a key
//! again returns it unchanged.

use crate::skeleton::Skeleton;
use crate::types::Bone;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoneKey(String);

impl BoneKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BoneKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn normalize(name: &str) -> BoneKey {
    let unqualified = match name.rfind(|c| c == ':' || c == '|') {
        Some(i) => &name[i + 1..],
        None => name,
    };
    let key = unqualified
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect();
    BoneKey(key)
}

/// First bone of the flat collection whose normalized name equals `key`.
pub fn lookup<'a>(skeleton: &'a Skeleton, key: &BoneKey) -> Option<&'a Bone> {
    if key.is_empty() {
        return None;
    }
    skeleton.bones().iter().find(|bone| normalize(&bone.name) == *key)
}
