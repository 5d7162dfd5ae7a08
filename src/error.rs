use std::io;
use thiserror::Error;

/// Errors produced by the asset loaders (motion clips and humanoid rigs).
/// Retargeting passes them through untouched.
#[derive(Error, Debug)]
pub enum AssetLoadError {
    /// I/O error while reading an asset
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed .bvh content
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Malformed rig description
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The rig description references a bone that was never declared
    #[error("Unknown bone: {0}")]
    UnknownBone(String),

    /// The rig description uses a name outside the humanoid vocabulary
    #[error("Unknown humanoid slot: {0}")]
    UnknownSlot(String),

    /// The loaded hierarchy could not be turned into a skeleton
    #[error("Invalid skeleton: {0}")]
    Skeleton(String),
}

impl AssetLoadError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        AssetLoadError::Parse {
            line,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Error taxonomy of the retargeting core.
#[derive(Error, Debug)]
pub enum RetargetError {
    /// The humanoid rig has no populated slot, so there is nothing to drive
    #[error("Humanoid rig has no populated bone slots")]
    MissingHumanoidData,

    /// `bind` was attempted before a correspondence was built
    #[error("Cannot bind: no correspondence has been built")]
    UnboundSlot,

    /// Correspondence requested while an asset is still loading
    #[error("Cannot build correspondence: {0} has not finished loading")]
    AssetsPending(&'static str),

    /// An asset is mutably borrowed elsewhere (e.g. by the renderer) and cannot be read or reset
    #[error("Cannot bind: {0} is borrowed elsewhere")]
    AssetBusy(&'static str),

    /// Operation on an updater that has been torn down
    #[error("Frame updater is stopped")]
    Stopped,

    #[error("Invalid skeleton: {0}")]
    InvalidSkeleton(String),

    #[error(transparent)]
    AssetLoad(#[from] AssetLoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type using RetargetError
pub type Result<T> = std::result::Result<T, RetargetError>;
