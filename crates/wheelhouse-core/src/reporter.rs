//! Reporter trait for dependency injection
//!
//! The resolver and the package manager report progress through this trait
//! so that the CLI can decide how to present it.

use wheelhouse_schema::{PackageName, Requirement, Version};

pub trait Reporter: Send + Sync {
    /// A requirement is about to be resolved.
    fn collecting(&self, req: &Requirement);

    /// A requirement is already met by a locked or installed version.
    fn satisfied(&self, req: &Requirement, version: &Version);

    /// A requirement was skipped because its marker does not apply.
    fn skipped(&self, req: &Requirement);

    /// An artifact is being fetched.
    fn downloading(&self, name: &PackageName, version: &Version, url: &str);

    /// An artifact is being handed to the installer.
    fn installing(&self, name: &PackageName, version: &Version);

    /// Marks a package as locked (or installed) with a short detail.
    fn done(&self, name: &PackageName, version: &Version, detail: &str);

    /// A requirement failed.
    fn failed(&self, req: &Requirement, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn collecting(&self, req: &Requirement) {
        (**self).collecting(req);
    }
    fn satisfied(&self, req: &Requirement, version: &Version) {
        (**self).satisfied(req, version);
    }
    fn skipped(&self, req: &Requirement) {
        (**self).skipped(req);
    }
    fn downloading(&self, name: &PackageName, version: &Version, url: &str) {
        (**self).downloading(name, version, url);
    }
    fn installing(&self, name: &PackageName, version: &Version) {
        (**self).installing(name, version);
    }
    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        (**self).done(name, version, detail);
    }
    fn failed(&self, req: &Requirement, reason: &str) {
        (**self).failed(req, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// Forwards every event to `tracing`, in pip's wording.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn collecting(&self, req: &Requirement) {
        tracing::info!("Collecting {req}");
    }
    fn satisfied(&self, req: &Requirement, version: &Version) {
        tracing::info!("Requirement already satisfied: {req} ({version})");
    }
    fn skipped(&self, req: &Requirement) {
        tracing::debug!("Ignoring {req}: markers don't match your environment");
    }
    fn downloading(&self, name: &PackageName, version: &Version, url: &str) {
        tracing::info!("Downloading {name}=={version} from {url}");
    }
    fn installing(&self, name: &PackageName, version: &Version) {
        tracing::info!("Installing {name}=={version}");
    }
    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        tracing::debug!("{name}=={version}: {detail}");
    }
    fn failed(&self, req: &Requirement, reason: &str) {
        tracing::warn!("{req}: {reason}");
    }
    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }
    fn warning(&self, msg: &str) {
        tracing::warn!("{msg}");
    }
}

/// A no-op reporter for silent operations (e.g., tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn collecting(&self, _: &Requirement) {}
    fn satisfied(&self, _: &Requirement, _: &Version) {}
    fn skipped(&self, _: &Requirement) {}
    fn downloading(&self, _: &PackageName, _: &Version, _: &str) {}
    fn installing(&self, _: &PackageName, _: &Version) {}
    fn done(&self, _: &PackageName, _: &Version, _: &str) {}
    fn failed(&self, _: &Requirement, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
}
