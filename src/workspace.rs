//! Package discovery and the `taskName → Task` table each package owns
//! (§3, §6). `Package` itself stays plain data; the registry
//! (`PackageSet`) is what assembles it eagerly from a located manifest,
//! sidestepping the self-referential `Package` ⟷ `Task` cycle the
//! abstract data model implies — a `Task` holds an `Arc<Package>` handle
//! rather than the owning package holding its own tasks inline.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::manifest::{derive_name, Manifest};
use crate::task::Task;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location(pub String);

impl Location {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug)]
pub struct Package {
    pub location: Location,
    pub manifest: Manifest,
    pub aliases: Vec<String>,
    pub sub_package_name: Option<String>,
}

impl Package {
    pub fn new(location: Location, manifest: Manifest) -> Self {
        let (aliases, sub_package_name) = match &manifest.name {
            Some(name) => {
                let derived = derive_name(name);
                (derived.aliases, derived.sub_package_name)
            }
            None => (Vec::new(), None),
        };
        Self { location, manifest, aliases, sub_package_name }
    }

    pub fn name(&self) -> Option<&str> {
        self.manifest.name.as_deref()
    }

    pub fn script(&self, name: &str) -> Option<&str> {
        self.manifest.scripts.get(name).map(String::as_str)
    }
}

/// Filesystem/package-discovery collaborator (§6). A real implementation
/// walks the filesystem from `root`; this crate ships only the in-memory
/// test double.
#[async_trait]
pub trait PackageLocator: Send + Sync {
    async fn locate(&self, root: &str) -> crate::error::Result<Vec<Location>>;
    async fn load(&self, location: &Location) -> crate::error::Result<Manifest>;
    fn base_name(&self, location: &Location) -> String;
    fn path(&self, location: &Location) -> String;
}

/// In-memory `PackageLocator` for tests: a fixed map of location → manifest.
#[derive(Clone, Debug, Default)]
pub struct MemLocator {
    manifests: HashMap<String, Manifest>,
}

impl MemLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, location: impl Into<String>, manifest: Manifest) -> Self {
        self.manifests.insert(location.into(), manifest);
        self
    }
}

#[async_trait]
impl PackageLocator for MemLocator {
    async fn locate(&self, root: &str) -> crate::error::Result<Vec<Location>> {
        let mut locations: Vec<Location> = self
            .manifests
            .keys()
            .filter(|loc| loc.starts_with(root))
            .map(|loc| Location(loc.clone()))
            .collect();
        locations.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(locations)
    }

    async fn load(&self, location: &Location) -> crate::error::Result<Manifest> {
        Ok(self.manifests.get(&location.0).cloned().unwrap_or_default())
    }

    fn base_name(&self, location: &Location) -> String {
        location.0.rsplit('/').next().unwrap_or(&location.0).to_string()
    }

    fn path(&self, location: &Location) -> String {
        location.0.clone()
    }
}

/// The manifest filename this crate's own (minimal) filesystem walker
/// looks for at and beneath the discovery root. The on-disk format
/// itself — which file name(s), which serialization — is the real
/// loader's concern and formally out of scope (§6); this is just enough
/// of a concrete choice to make the CLI front door runnable end to end.
pub const MANIFEST_FILE_NAME: &str = "runz.json";

/// Real filesystem `PackageLocator` (§6): recursively finds every
/// `runz.json` at or beneath `root` and loads it as a [`Manifest`].
/// Directories are visited depth-first; a directory containing a
/// manifest is still descended into, since nested packages are a normal
/// shape for this kind of workspace.
#[derive(Clone, Debug, Default)]
pub struct FsLocator;

impl FsLocator {
    pub fn new() -> Self {
        Self
    }

    fn walk(dir: &std::path::Path, out: &mut Vec<Location>) -> std::io::Result<()> {
        let manifest_path = dir.join(MANIFEST_FILE_NAME);
        if manifest_path.is_file() {
            out.push(Location(dir.to_string_lossy().into_owned()));
        }
        let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let path = entry.path();
            if path.is_dir() && !entry.file_name().to_string_lossy().starts_with('.') {
                Self::walk(&path, out)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PackageLocator for FsLocator {
    async fn locate(&self, root: &str) -> crate::error::Result<Vec<Location>> {
        let root = root.to_string();
        tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            let _ = Self::walk(std::path::Path::new(&root), &mut out);
            out
        })
        .await
        .map_err(|source| crate::error::RunzError::Spawn {
            task_name: "package discovery".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, source.to_string()),
        })
    }

    async fn load(&self, location: &Location) -> crate::error::Result<Manifest> {
        let path = std::path::Path::new(&location.0).join(MANIFEST_FILE_NAME);
        let bytes = tokio::fs::read(&path).await.map_err(|source| crate::error::RunzError::Spawn {
            task_name: location.0.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|err| crate::error::RunzError::Spawn {
            task_name: location.0.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()),
        })
    }

    fn base_name(&self, location: &Location) -> String {
        std::path::Path::new(&location.0)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| location.0.clone())
    }

    fn path(&self, location: &Location) -> String {
        location.0.clone()
    }
}

/// Owns every located `Package` plus the eagerly-built `taskName → Task`
/// table for each of them (§3, "Owns a mapping taskName → Task built
/// eagerly at construction").
#[derive(Default)]
pub struct PackageSet {
    packages: HashMap<String, Arc<Package>>,
    tasks: HashMap<(String, String), Task>,
}

impl PackageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every package under `root` via `locator` and build their task
    /// tables.
    pub async fn discover(locator: &dyn PackageLocator, root: &str) -> crate::error::Result<Self> {
        let mut set = Self::new();
        for location in locator.locate(root).await? {
            let manifest = locator.load(&location).await?;
            set.insert(location, manifest)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, location: Location, manifest: Manifest) -> crate::error::Result<Arc<Package>> {
        let key = location.0.clone();
        let package = Arc::new(Package::new(location, manifest));
        for (name, command_line) in &package.manifest.scripts {
            let task = Task::from_script(Arc::clone(&package), name.clone(), command_line)?;
            self.tasks.insert((key.clone(), name.clone()), task);
        }
        self.packages.insert(key, Arc::clone(&package));
        Ok(package)
    }

    pub fn package(&self, location: &str) -> Option<Arc<Package>> {
        self.packages.get(location).cloned()
    }

    pub fn task(&self, location: &str, name: &str) -> Option<&Task> {
        self.tasks.get(&(location.to_string(), name.to_string()))
    }

    /// Every distinct task name known anywhere in the set, for "did you
    /// mean" suggestions at the CLI boundary.
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.keys().map(|(_, name)| name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// The nearest named ancestor of `location` by longest-prefix match
    /// among this set's registered locations (§3 `hostPackage`).
    pub fn host_package(&self, location: &str) -> Option<Arc<Package>> {
        self.packages
            .values()
            .filter(|pkg| pkg.location.as_str() != location && location.starts_with(pkg.location.as_str()) && pkg.name().is_some())
            .max_by_key(|pkg| pkg.location.as_str().len())
            .cloned()
    }

    /// Resolve a `PackageSelector.host` (`.`, `..`, `./x`, `../x`) relative
    /// to `from`, returning the matching package's location if one is
    /// registered at that path.
    pub fn resolve_selector(&self, from: &str, host: &str) -> Option<String> {
        let resolved = match host {
            "." => from.to_string(),
            ".." => parent_path(from),
            other if other.starts_with("./") => join_path(from, &other[2..]),
            other if other.starts_with("../") => join_path(&parent_path(from), &other[3..]),
            other => join_path(from, other),
        };
        self.packages.contains_key(&resolved).then_some(resolved)
    }
}

fn parent_path(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent.to_string(),
        _ => "/".to_string(),
    }
}

fn join_path(base: &str, rel: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{rel}")
    } else {
        format!("{base}/{rel}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn discover_builds_task_tables_eagerly() {
        let mut manifest = Manifest::default();
        manifest.scripts.insert("build".to_string(), "run-z compile".to_string());
        let locator = MemLocator::new().with("/repo/widget", manifest);

        let set = PackageSet::discover(&locator, "/repo").await.unwrap();
        assert!(set.task("/repo/widget", "build").is_some());
        assert!(set.task("/repo/widget", "missing").is_none());
    }

    #[test]
    fn host_package_is_the_nearest_named_ancestor() {
        let mut set = PackageSet::new();
        let mut root_manifest = Manifest::default();
        root_manifest.name = Some("root".to_string());
        set.insert(Location("/repo".to_string()), root_manifest).unwrap();
        set.insert(Location("/repo/widget".to_string()), Manifest::default()).unwrap();

        let host = set.host_package("/repo/widget").unwrap();
        assert_eq!(host.name(), Some("root"));
    }

    #[test]
    fn resolve_selector_handles_relative_forms() {
        let mut set = PackageSet::new();
        set.insert(Location("/repo/widget".to_string()), Manifest::default()).unwrap();
        set.insert(Location("/repo/sibling".to_string()), Manifest::default()).unwrap();

        assert_eq!(
            set.resolve_selector("/repo/widget", "../sibling"),
            Some("/repo/sibling".to_string())
        );
        assert_eq!(set.resolve_selector("/repo/widget", "."), Some("/repo/widget".to_string()));
    }

    #[tokio::test]
    async fn fs_locator_finds_nested_manifests() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(
            root.path().join(MANIFEST_FILE_NAME),
            r#"{"name": "root", "scripts": {"build": "run-z ./child/build"}}"#,
        )
        .unwrap();
        let child = root.path().join("child");
        std::fs::create_dir_all(&child).unwrap();
        std::fs::write(child.join(MANIFEST_FILE_NAME), r#"{"name": "child", "scripts": {"build": "echo child"}}"#).unwrap();

        let locator = FsLocator::new();
        let set = PackageSet::discover(&locator, root.path().to_str().unwrap()).await.unwrap();

        assert!(set.task(root.path().to_str().unwrap(), "build").is_some());
        assert!(set.task(child.to_str().unwrap(), "build").is_some());
    }
}
