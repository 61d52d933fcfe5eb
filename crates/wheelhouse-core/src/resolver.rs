//! Concurrent expansion of requirements into a locked dependency closure.
//!
//! Every requirement becomes one future. A node registers its extras,
//! applies constraints, checks its marker, and then either finds the name
//! already satisfied or resolves a version (from the baseline lock, a
//! direct URL or the index) and locks it. Its dependencies are gathered as
//! a new batch of futures that must all finish before the node does.
//!
//! Shared state sits behind a `std::sync::Mutex`. The guard is never held
//! across an `.await`, so each check-then-insert on the locked map is one
//! atomic step. Index queries are registered there too: concurrent
//! branches needing the same project await one shared query.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures::FutureExt;
use futures::future::{self, BoxFuture, Shared, WeakShared};
use wheelhouse_schema::{
    MarkerContext, MarkerEnvironment, PackageName, Requirement, Sha256Hash, Version,
    WheelFilename, url_filename,
};

use crate::compat::SupportedTags;
use crate::constraints::{Constraints, constrain_requirement};
use crate::error::ResolveError;
use crate::fetch::{FetchOptions, Fetcher, verify_sha256};
use crate::index::{CandidateArtifact, MetadataAvailability, ProjectInfo, query_package};
use crate::lockfile::{LockEntry, Lockfile};
use crate::metadata::DistributionMetadata;
use crate::reporter::{NullReporter, Reporter};
use crate::selector::find_best;

/// Knobs for one resolution.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Record failures and keep exploring instead of aborting.
    pub keep_going: bool,
    /// Follow `Requires-Dist`.
    pub include_deps: bool,
    /// Allow pre-releases for every requirement.
    pub pre: bool,
    /// Replace locked or installed versions that conflict.
    pub reinstall: bool,
    pub index_urls: Vec<String>,
    pub constraints: Constraints,
    pub fetch: FetchOptions,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            keep_going: false,
            include_deps: true,
            pre: false,
            reinstall: false,
            index_urls: Vec::new(),
            constraints: Constraints::new(),
            fetch: FetchOptions::default(),
        }
    }
}

/// A wheel chosen for installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub name: PackageName,
    pub version: Version,
    pub artifact: CandidateArtifact,
    /// The requirement that locked this package.
    pub requirement: Requirement,
    /// Every extra requested for the package across the graph.
    pub extras: BTreeSet<String>,
    /// Canonical names of the dependencies that were gathered.
    pub depends: Vec<PackageName>,
    /// The wheel, if it was already downloaded to read its metadata.
    pub data: Option<Bytes>,
}

impl ResolvedArtifact {
    /// Project name as spelled in the wheel filename.
    pub fn display_name(&self) -> &str {
        self.artifact
            .filename
            .split('-')
            .next()
            .unwrap_or(self.name.as_str())
    }

    /// Lockfile entry for this artifact, using the index-provided hash.
    pub fn lock_entry(&self) -> LockEntry {
        LockEntry {
            name: self.display_name().to_string(),
            version: self.version.clone(),
            file_name: self.artifact.url.clone(),
            sha256: self
                .artifact
                .hash
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            install_dir: "site".to_string(),
            depends: self.depends.clone(),
        }
    }
}

/// A package satisfied from the baseline lockfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrebuiltPackage {
    pub name: PackageName,
    pub entry: LockEntry,
}

impl PrebuiltPackage {
    pub fn version(&self) -> &Version {
        &self.entry.version
    }
}

/// Outcome of a transaction.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Wheels to fetch and install, sorted by name.
    pub artifacts: Vec<ResolvedArtifact>,
    /// Baseline packages the closure relies on, sorted by name.
    pub prebuilt: Vec<PrebuiltPackage>,
    /// Requirements that failed, in the order they failed.
    pub failures: Vec<(Requirement, ResolveError)>,
}

impl Resolution {
    /// Locked version of `name`, from either source.
    pub fn version_of(&self, name: &str) -> Option<&Version> {
        self.artifacts
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.version)
            .or_else(|| {
                self.prebuilt
                    .iter()
                    .find(|p| p.name == name)
                    .map(PrebuiltPackage::version)
            })
    }

    pub fn unresolved(&self) -> Vec<Requirement> {
        self.failures.iter().map(|(req, _)| req.clone()).collect()
    }

    /// Every locked package, baseline entries included.
    pub fn to_lockfile(&self) -> Lockfile {
        let mut lock = Lockfile::default();
        for package in &self.prebuilt {
            lock.insert(package.entry.clone());
        }
        for artifact in &self.artifacts {
            lock.insert(artifact.lock_entry());
        }
        lock
    }
}

#[derive(Debug)]
enum Source {
    Artifact(ResolvedArtifact),
    Prebuilt(PrebuiltPackage),
}

#[derive(Debug)]
struct Locked {
    version: Version,
    source: Source,
    metadata: Option<Arc<DistributionMetadata>>,
    /// Extras whose dependencies have been gathered.
    extras_applied: BTreeSet<String>,
}

impl Locked {
    fn new(version: Version, source: Source) -> Self {
        Self {
            version,
            source,
            metadata: None,
            extras_applied: BTreeSet::new(),
        }
    }
}

type ProjectQuery = BoxFuture<'static, Result<Arc<ProjectInfo>, ResolveError>>;

#[derive(Default)]
struct State {
    locked: BTreeMap<PackageName, Locked>,
    extras: HashMap<PackageName, BTreeSet<String>>,
    failures: Vec<(Requirement, ResolveError)>,
    /// Index queries still awaited by some branch.
    queries: HashMap<PackageName, WeakShared<ProjectQuery>>,
}

/// One resolution run.
pub struct Transaction {
    fetcher: Arc<dyn Fetcher>,
    reporter: Arc<dyn Reporter>,
    tags: SupportedTags,
    context: MarkerContext,
    python: Option<Version>,
    options: ResolveOptions,
    installed: BTreeMap<PackageName, Version>,
    baseline: BTreeMap<PackageName, LockEntry>,
    state: Mutex<State>,
}

impl Transaction {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        environment: &MarkerEnvironment,
        tags: SupportedTags,
        options: ResolveOptions,
    ) -> Self {
        Self {
            fetcher,
            reporter: Arc::new(NullReporter),
            tags,
            context: environment.to_context(None),
            python: Version::parse(&environment.python_full_version).ok(),
            options,
            installed: BTreeMap::new(),
            baseline: BTreeMap::new(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Versions already present in the target environment.
    pub fn with_installed(mut self, installed: BTreeMap<PackageName, Version>) -> Self {
        self.installed = installed;
        self
    }

    /// Packages that can be used without touching the index.
    pub fn with_baseline(mut self, baseline: &Lockfile) -> Self {
        self.baseline = baseline.packages.clone();
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve `requirements` and everything they pull in.
    ///
    /// Returns once every node has finished. With `keep_going` failures are
    /// only recorded (see [`Transaction::failures`]); without it the first
    /// failure cancels the remaining work and is returned.
    ///
    /// # Errors
    ///
    /// The first [`ResolveError`] when `keep_going` is off.
    pub async fn gather_requirements(
        &self,
        requirements: Vec<Requirement>,
    ) -> Result<(), ResolveError> {
        self.gather(requirements, None).await
    }

    fn gather(
        &self,
        requirements: Vec<Requirement>,
        owner: Option<PackageName>,
    ) -> BoxFuture<'_, Result<(), ResolveError>> {
        async move {
            let nodes = requirements
                .into_iter()
                .map(|req| self.resolve_node(req, owner.clone()));
            if self.options.keep_going {
                future::join_all(nodes)
                    .await
                    .into_iter()
                    .collect::<Result<Vec<()>, _>>()?;
            } else {
                future::try_join_all(nodes).await?;
            }
            Ok(())
        }
        .boxed()
    }

    async fn resolve_node(
        &self,
        req: Requirement,
        owner: Option<PackageName>,
    ) -> Result<(), ResolveError> {
        match self.resolve_one(&req, owner.as_ref()).await {
            Ok(deps) if deps.is_empty() => Ok(()),
            Ok(deps) => self.gather(deps, Some(req.name.clone())).await,
            Err(error) => {
                self.reporter.failed(&req, &error.to_string());
                self.state().failures.push((req, error.clone()));
                if self.options.keep_going {
                    Ok(())
                } else {
                    Err(error)
                }
            }
        }
    }

    /// Run one node up to locking and return the dependencies to gather
    /// next.
    async fn resolve_one(
        &self,
        req: &Requirement,
        owner: Option<&PackageName>,
    ) -> Result<Vec<Requirement>, ResolveError> {
        if !req.extras.is_empty() {
            self.state()
                .extras
                .entry(req.name.clone())
                .or_default()
                .extend(req.extras.iter().cloned());
        }

        let mut req = constrain_requirement(req, &self.options.constraints);
        if self.options.pre {
            req.specifier_mut().set_prereleases(Some(true));
        }

        if let Some(marker) = &req.marker {
            let owner_extras = owner
                .and_then(|owner| self.state().extras.get(owner).cloned())
                .unwrap_or_default();
            let applies = marker
                .evaluate_with_extras(&self.context, owner_extras.iter().map(String::as_str))
                .map_err(|source| ResolveError::Marker {
                    requirement: req.to_string(),
                    source,
                })?;
            if !applies {
                self.reporter.skipped(&req);
                return Ok(Vec::new());
            }
        }

        if let Some(deps) = self.check_satisfied(&req)? {
            return Ok(deps);
        }
        if let Some(deps) = self.lock_prebuilt(&req)? {
            return Ok(deps);
        }

        self.reporter.collecting(&req);
        let artifact = match &req.url {
            Some(url) => self.direct_artifact(&req, url)?,
            None => self.find_artifact(&req).await?,
        };
        let version = artifact.wheel.version.clone();

        let resolved = ResolvedArtifact {
            name: req.name.clone(),
            version: version.clone(),
            artifact: artifact.clone(),
            requirement: req.clone(),
            extras: BTreeSet::new(),
            depends: Vec::new(),
            data: None,
        };
        if let Some(deps) = self.try_lock(&req, resolved)? {
            return Ok(deps);
        }
        self.reporter.done(&req.name, &version, &artifact.filename);

        if !self.options.include_deps {
            return Ok(Vec::new());
        }

        let (metadata, data) = self.fetch_metadata(&req.name, &version, &artifact).await?;
        let metadata = Arc::new(metadata);
        let extras = {
            let mut state = self.state();
            let registered = state.extras.get(&req.name).cloned().unwrap_or_default();
            if let Some(locked) = state.locked.get_mut(&req.name)
                && locked.version == version
            {
                locked.metadata = Some(Arc::clone(&metadata));
                locked.extras_applied.clone_from(&registered);
                if let Source::Artifact(resolved) = &mut locked.source {
                    resolved.data = data;
                    resolved.extras.clone_from(&registered);
                }
            }
            registered
        };

        let deps = metadata.requires(&self.context, &extras)?;
        self.record_depends(&req.name, &deps);
        Ok(deps)
    }

    /// `Some(deps)` when a locked or installed version already satisfies
    /// `req`; `deps` are what newly registered extras add.
    fn check_satisfied(
        &self,
        req: &Requirement,
    ) -> Result<Option<Vec<Requirement>>, ResolveError> {
        let locked = self
            .state()
            .locked
            .get(&req.name)
            .map(|locked| locked.version.clone());
        let (version, is_locked) = match locked {
            Some(version) => (version, true),
            None => match self.installed.get(&req.name) {
                Some(version) => (version.clone(), false),
                None => return Ok(None),
            },
        };

        if req.specifier.contains(&version, Some(true)) {
            self.reporter.satisfied(req, &version);
            if is_locked {
                return self.late_extras(&req.name).map(Some);
            }
            return Ok(Some(Vec::new()));
        }
        if self.options.reinstall {
            tracing::debug!("superseding {}=={version} for '{req}'", req.name);
            return Ok(None);
        }
        Err(ResolveError::VersionConflict {
            requirement: req.to_string(),
            name: req.name.clone(),
            installed: version,
        })
    }

    /// Lock `req` to its baseline entry when that entry satisfies it.
    fn lock_prebuilt(&self, req: &Requirement) -> Result<Option<Vec<Requirement>>, ResolveError> {
        let Some(entry) = self.baseline.get(&req.name) else {
            return Ok(None);
        };
        if !req.specifier.contains(&entry.version, Some(true)) {
            tracing::debug!(
                "baseline {}=={} does not satisfy '{req}'",
                req.name,
                entry.version
            );
            return Ok(None);
        }

        let raced = {
            let mut state = self.state();
            match state.locked.get(&req.name) {
                Some(locked) if req.specifier.contains(&locked.version, Some(true)) => {
                    Some(Ok(locked.version.clone()))
                }
                Some(locked) if !self.options.reinstall => Some(Err(locked.version.clone())),
                _ => {
                    let prebuilt = PrebuiltPackage {
                        name: req.name.clone(),
                        entry: entry.clone(),
                    };
                    state.locked.insert(
                        req.name.clone(),
                        Locked::new(entry.version.clone(), Source::Prebuilt(prebuilt)),
                    );
                    None
                }
            }
        };
        match raced {
            None => {}
            Some(Ok(version)) => {
                self.reporter.satisfied(req, &version);
                return Ok(Some(Vec::new()));
            }
            Some(Err(installed)) => {
                return Err(ResolveError::VersionConflict {
                    requirement: req.to_string(),
                    name: req.name.clone(),
                    installed,
                });
            }
        }
        self.reporter.done(&req.name, &entry.version, "baseline");

        if !self.options.include_deps {
            return Ok(Some(Vec::new()));
        }
        Ok(Some(
            entry
                .depends
                .iter()
                .map(|name| Requirement::new(name.clone()))
                .collect(),
        ))
    }

    async fn find_artifact(&self, req: &Requirement) -> Result<CandidateArtifact, ResolveError> {
        let project = self.project_query(&req.name).await?;
        let artifact = find_best(&project, req, &self.tags, self.python.as_ref())?;
        Ok(artifact.clone())
    }

    /// The index query for `name`. Branches asking while a query is in
    /// flight join it instead of starting another.
    fn project_query(&self, name: &PackageName) -> Shared<ProjectQuery> {
        let mut state = self.state();
        if let Some(query) = state.queries.get(name).and_then(WeakShared::upgrade) {
            tracing::debug!("joining the in-flight index query for {name}");
            return query;
        }

        let fetcher = Arc::clone(&self.fetcher);
        let project = name.clone();
        let index_urls = self.options.index_urls.clone();
        let options = self.options.fetch.clone();
        let tags = self.tags.clone();
        let query = async move {
            let info = query_package(fetcher.as_ref(), &project, &index_urls, &options).await?;
            Ok::<_, ResolveError>(Arc::new(info.compatible_only(&tags)))
        }
        .boxed()
        .shared();
        if let Some(weak) = query.downgrade() {
            state.queries.insert(name.clone(), weak);
        }
        query
    }

    /// Build the candidate for a `name @ url` requirement without asking
    /// the index.
    fn direct_artifact(&self, req: &Requirement, url: &str) -> Result<CandidateArtifact, ResolveError> {
        let (location, fragment) = match url.split_once('#') {
            Some((location, fragment)) => (location, Some(fragment)),
            None => (url, None),
        };
        let filename = url_filename(location).to_string();
        let wheel = WheelFilename::parse(&filename).map_err(|e| ResolveError::InvalidWheel {
            filename: filename.clone(),
            reason: e.to_string(),
        })?;
        if wheel.name != req.name {
            return Err(ResolveError::InvalidWheel {
                filename,
                reason: format!("wheel is for '{}', not '{}'", wheel.name, req.name),
            });
        }
        if let Some(reason) = self.tags.explain_incompatibility(&wheel) {
            return Err(ResolveError::IncompatibleWheel { filename, reason });
        }

        let hash = fragment
            .and_then(|f| f.strip_prefix("sha256="))
            .and_then(|h| Sha256Hash::new(h).ok());
        Ok(CandidateArtifact {
            filename,
            url: location.to_string(),
            hash,
            size: None,
            wheel,
            requires_python: None,
            metadata: MetadataAvailability::Absent,
            yanked: false,
            yanked_reason: None,
        })
    }

    /// Insert the lock unless another branch got there first, in which case
    /// `req` is checked against that lock instead.
    fn try_lock(
        &self,
        req: &Requirement,
        resolved: ResolvedArtifact,
    ) -> Result<Option<Vec<Requirement>>, ResolveError> {
        let raced = {
            let mut state = self.state();
            match state.locked.get(&req.name) {
                Some(locked) if req.specifier.contains(&locked.version, Some(true)) => {
                    Some(Ok(locked.version.clone()))
                }
                Some(locked) if !self.options.reinstall => Some(Err(locked.version.clone())),
                _ => {
                    state.locked.insert(
                        req.name.clone(),
                        Locked::new(resolved.version.clone(), Source::Artifact(resolved)),
                    );
                    None
                }
            }
        };

        match raced {
            None => Ok(None),
            Some(Ok(version)) => {
                tracing::debug!("{} was locked at {version} concurrently", req.name);
                self.reporter.satisfied(req, &version);
                self.late_extras(&req.name).map(Some)
            }
            Some(Err(installed)) => Err(ResolveError::VersionConflict {
                requirement: req.to_string(),
                name: req.name.clone(),
                installed,
            }),
        }
    }

    /// Dependencies contributed by extras registered for `name` after its
    /// own dependencies were gathered.
    fn late_extras(&self, name: &PackageName) -> Result<Vec<Requirement>, ResolveError> {
        let (metadata, applied, all) = {
            let mut state = self.state();
            let registered = state.extras.get(name).cloned().unwrap_or_default();
            let Some(locked) = state.locked.get_mut(name) else {
                return Ok(Vec::new());
            };
            // Still fetching: the locking branch will read the extras.
            let Some(metadata) = locked.metadata.clone() else {
                return Ok(Vec::new());
            };
            if registered.is_subset(&locked.extras_applied) {
                return Ok(Vec::new());
            }
            let applied = locked.extras_applied.clone();
            locked.extras_applied.extend(registered);
            let all = locked.extras_applied.clone();
            if let Source::Artifact(resolved) = &mut locked.source {
                resolved.extras.clone_from(&all);
            }
            (metadata, applied, all)
        };

        tracing::debug!("{name}: gathering dependencies for extras {all:?}");
        let before = metadata.requires(&self.context, &applied)?;
        let deps: Vec<Requirement> = metadata
            .requires(&self.context, &all)?
            .into_iter()
            .filter(|req| !before.contains(req))
            .collect();
        self.record_depends(name, &deps);
        Ok(deps)
    }

    fn record_depends(&self, name: &PackageName, deps: &[Requirement]) {
        let mut state = self.state();
        if let Some(Locked {
            source: Source::Artifact(resolved),
            ..
        }) = state.locked.get_mut(name)
        {
            for dep in deps {
                if !resolved.depends.contains(&dep.name) {
                    resolved.depends.push(dep.name.clone());
                }
            }
        }
    }

    /// Read the wheel's metadata, preferring the PEP 658 side-channel so the
    /// wheel itself is only downloaded when the index offers nothing else.
    async fn fetch_metadata(
        &self,
        name: &PackageName,
        version: &Version,
        artifact: &CandidateArtifact,
    ) -> Result<(DistributionMetadata, Option<Bytes>), ResolveError> {
        if let Some(url) = artifact.metadata_url() {
            match self.fetcher.fetch_bytes(&url, &self.options.fetch).await {
                Ok(data) => {
                    if let MetadataAvailability::Hashed(expected) = &artifact.metadata {
                        verify(&url, &data, expected)?;
                    }
                    let metadata = DistributionMetadata::parse(&String::from_utf8_lossy(&data));
                    return Ok((metadata, None));
                }
                Err(e) => {
                    tracing::debug!("no metadata side-channel for {name} ({e}), downloading the wheel");
                }
            }
        }

        self.reporter.downloading(name, version, &artifact.url);
        let data = self.fetcher.fetch_bytes(&artifact.url, &self.options.fetch).await?;
        if let Some(expected) = &artifact.hash {
            verify(&artifact.url, &data, expected)?;
        }
        let metadata = DistributionMetadata::from_wheel(&data, name)?;
        Ok((metadata, Some(data)))
    }

    /// Snapshot of the failures recorded so far.
    pub fn failures(&self) -> Vec<(Requirement, ResolveError)> {
        self.state().failures.clone()
    }

    /// Snapshot of the locked versions.
    pub fn locked_versions(&self) -> BTreeMap<PackageName, Version> {
        self.state()
            .locked
            .iter()
            .map(|(name, locked)| (name.clone(), locked.version.clone()))
            .collect()
    }

    pub fn into_resolution(self) -> Resolution {
        let state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        let mut resolution = Resolution {
            failures: state.failures,
            ..Resolution::default()
        };
        for locked in state.locked.into_values() {
            match locked.source {
                Source::Artifact(artifact) => resolution.artifacts.push(artifact),
                Source::Prebuilt(prebuilt) => resolution.prebuilt.push(prebuilt),
            }
        }
        resolution
    }
}

/// Check downloaded bytes against the digest the index published.
pub(crate) fn verify(url: &str, data: &[u8], expected: &Sha256Hash) -> Result<(), ResolveError> {
    verify_sha256(data, expected).map_err(|actual| ResolveError::HashMismatch {
        url: url.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, Headers};
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl Fetcher for Offline {
        async fn fetch_bytes(&self, url: &str, _: &FetchOptions) -> Result<Bytes, FetchError> {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }

        async fn fetch_text_and_headers(
            &self,
            url: &str,
            _: &FetchOptions,
        ) -> Result<(String, Headers), FetchError> {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn transaction(options: ResolveOptions) -> Transaction {
        let environment = MarkerEnvironment::default();
        let tags = SupportedTags::from_environment(
            &environment,
            &["manylinux_2_17_x86_64".to_string()],
        );
        Transaction::new(Arc::new(Offline), &environment, tags, options)
    }

    fn req(s: &str) -> Requirement {
        Requirement::parse(s).unwrap()
    }

    #[test]
    fn test_direct_artifact() {
        let tx = transaction(ResolveOptions::default());
        let r = req("demo @ https://files.example/demo-1.0-py3-none-any.whl#sha256=9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08");
        let artifact = tx.direct_artifact(&r, r.url.as_deref().unwrap()).unwrap();
        assert_eq!(artifact.url, "https://files.example/demo-1.0-py3-none-any.whl");
        assert_eq!(artifact.filename, "demo-1.0-py3-none-any.whl");
        assert!(artifact.hash.is_some());

        let windows = req("demo @ https://files.example/demo-1.0-cp312-cp312-win_amd64.whl");
        let err = tx
            .direct_artifact(&windows, windows.url.as_deref().unwrap())
            .unwrap_err();
        assert!(
            matches!(&err, ResolveError::IncompatibleWheel { reason, .. } if reason.contains("platform")),
            "{err}"
        );

        let other = req("other @ https://files.example/demo-1.0-py3-none-any.whl");
        assert!(matches!(
            tx.direct_artifact(&other, other.url.as_deref().unwrap()),
            Err(ResolveError::InvalidWheel { .. })
        ));
    }

    #[tokio::test]
    async fn test_keep_going_records_every_failure() {
        let tx = transaction(ResolveOptions {
            keep_going: true,
            ..ResolveOptions::default()
        });
        tx.gather_requirements(vec![req("missing-a"), req("missing-b")])
            .await
            .unwrap();
        let failures = tx.failures();
        assert_eq!(failures.len(), 2);
        assert!(
            failures
                .iter()
                .all(|(_, e)| matches!(e, ResolveError::Index(_)))
        );
    }

    #[tokio::test]
    async fn test_installed_conflict() {
        let tx = transaction(ResolveOptions::default()).with_installed(BTreeMap::from([(
            PackageName::new("attrs"),
            Version::parse("21.0").unwrap(),
        )]));
        let err = tx
            .gather_requirements(vec![req("attrs>=22")])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Requested 'attrs>=22', but attrs==21.0 is already installed"
        );

        // Satisfied without touching the (offline) index.
        tx.gather_requirements(vec![req("attrs<22")]).await.unwrap();
        assert!(tx.locked_versions().is_empty());
    }

    #[tokio::test]
    async fn test_marker_excludes_requirement() {
        let tx = transaction(ResolveOptions::default());
        tx.gather_requirements(vec![req("pywin32 ; sys_platform == 'win32'")])
            .await
            .unwrap();
        assert!(tx.failures().is_empty());
    }

    #[tokio::test]
    async fn test_baseline_short_circuit() {
        let baseline = Lockfile::from_json(
            r#"{"packages": {"six": {"name": "six", "version": "1.16.0",
                "file_name": "https://files.example/six-1.16.0-py2.py3-none-any.whl"}}}"#,
        )
        .unwrap();
        let tx = transaction(ResolveOptions::default()).with_baseline(&baseline);
        tx.gather_requirements(vec![req("six>=1.15")]).await.unwrap();
        let resolution = tx.into_resolution();
        assert_eq!(resolution.prebuilt.len(), 1);
        assert_eq!(resolution.version_of("six").unwrap().to_string(), "1.16.0");
    }
}
