pub mod compat;
pub mod config;
pub mod constraints;
pub mod error;
pub mod fetch;
pub mod index;
pub mod lockfile;
pub mod manager;
pub mod metadata;
pub mod resolver;
pub mod selector;

pub mod reporter;

pub use compat::SupportedTags;
pub use config::Config;
pub use error::ResolveError;
pub use fetch::{FetchOptions, Fetcher, HttpFetcher};
pub use lockfile::{LockEntry, Lockfile};
pub use manager::{InstallOptions, Installer, PackageManager, UnpackInstaller};
pub use reporter::{NullReporter, Reporter, TracingReporter};
pub use resolver::{PrebuiltPackage, Resolution, ResolveOptions, ResolvedArtifact, Transaction};

/// User Agent string for index and artifact requests
pub const USER_AGENT: &str = concat!("wheelhouse-core/", env!("CARGO_PKG_VERSION"));
