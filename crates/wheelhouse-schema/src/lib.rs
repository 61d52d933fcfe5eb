//! Shared types for wheelhouse.
//!
//! Everything in this crate is pure data: parsing, ordering and evaluation
//! with no I/O. The resolver, index client and CLI all build on these types.

pub mod hash;
pub mod marker;
pub mod name;
pub mod requirement;
pub mod specifier;
pub mod version;
pub mod wheel;

// Re-exports
pub use hash::{HashError, Sha256Hash};
pub use marker::{
    MarkerContext, MarkerEnvironment, MarkerError, MarkerOperator, MarkerTree, MarkerValue,
};
pub use name::{PackageName, canonicalize_name};
pub use requirement::{Requirement, RequirementError};
pub use specifier::{Operator, Specifier, SpecifierError, SpecifierSet};
pub use version::{Version, VersionError};
pub use wheel::{BuildTag, Tag, WheelFilename, WheelFilenameError, url_filename};
