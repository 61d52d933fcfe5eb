use thiserror::Error;
use wheelhouse_schema::{MarkerError, PackageName, RequirementError, Version};

use crate::fetch::FetchError;
use crate::index::IndexError;
use crate::metadata::MetadataError;

/// Everything that can go wrong while resolving one requirement.
///
/// Errors are `Clone` so a failure can be both recorded in the transaction's
/// failure list and returned to abort the fan-out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    InvalidRequirement(#[from] RequirementError),

    #[error("cannot evaluate marker of '{requirement}': {source}")]
    Marker {
        requirement: String,
        source: MarkerError,
    },

    #[error(
        "Can't find a compatible wheel for '{requirement}'. \
         You can use keep-going to get a list of all packages with missing wheels."
    )]
    NoCompatibleArtifact { requirement: String },

    #[error("Requested '{requirement}', but {name}=={installed} is already installed")]
    VersionConflict {
        requirement: String,
        name: PackageName,
        installed: Version,
    },

    #[error(transparent)]
    Network(#[from] FetchError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Contents of {url} don't match hash: expected {expected}, got {actual}")]
    HashMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("invalid wheel '{filename}': {reason}")]
    InvalidWheel { filename: String, reason: String },

    #[error("{reason}")]
    IncompatibleWheel { filename: String, reason: String },

    #[error(transparent)]
    InvalidMetadata(#[from] MetadataError),

    #[error("failed to install {name}: {reason}")]
    Install { name: PackageName, reason: String },

    /// Every requirement that failed, as written (some may not parse).
    #[error("Can't resolve: {}", .unresolved.join(", "))]
    Unresolved { unresolved: Vec<String> },
}

impl ResolveError {
    /// The requirements that failed, when this is the facade-level error.
    pub fn unresolved(&self) -> &[String] {
        match self {
            Self::Unresolved { unresolved } => unresolved,
            _ => &[],
        }
    }
}
