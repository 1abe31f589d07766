use crate::common::{FacesError, Result};
use crate::core::types::{FacePatch, Identity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const STORAGE_VERSION: u32 = 1;

/// Face patches and identities storage. Mutations auto-commit.
pub trait Registry {
    /// Store a face and its identity.
    ///
    /// Re-adding a known pair is a no-op. Adding a known patch under a
    /// different identity fails with [`FacesError::Conflict`] and leaves the
    /// store untouched.
    fn add(&mut self, patch: FacePatch, identity: Identity) -> Result<()>;

    /// Remove an identity and all of its faces. Unknown identities are ignored.
    fn remove(&mut self, identity: &Identity) -> Result<()>;

    /// Iterate over all stored pairs, in no particular order.
    fn iter(&self) -> Box<dyn Iterator<Item = (&FacePatch, &Identity)> + '_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored faces per identity.
    fn summary(&self) -> BTreeMap<Identity, usize> {
        let mut counts = BTreeMap::new();
        for (_, identity) in self.iter() {
            *counts.entry(identity.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Set of (patch, identity) pairs with value-equality dedup.
#[derive(Debug, Default, Clone)]
struct Entries(Vec<(FacePatch, Identity)>);

impl Entries {
    /// Returns `true` if the pair was inserted, `false` if it was already present.
    fn insert(&mut self, patch: FacePatch, identity: Identity) -> Result<bool> {
        let known_as: BTreeSet<Identity> = self
            .0
            .iter()
            .filter(|(known, _)| *known == patch)
            .map(|(_, id)| id.clone())
            .collect();

        if known_as.is_empty() {
            self.0.push((patch, identity));
            return Ok(true);
        }

        if known_as.len() == 1 && known_as.contains(&identity) {
            return Ok(false);
        }

        Err(FacesError::Conflict { known_as })
    }

    /// Returns the number of removed pairs.
    fn remove(&mut self, identity: &Identity) -> usize {
        let before = self.0.len();
        self.0.retain(|(_, id)| id != identity);
        before - self.0.len()
    }

    fn iter(&self) -> impl Iterator<Item = (&FacePatch, &Identity)> + '_ {
        self.0.iter().map(|(patch, identity)| (patch, identity))
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// Registry held in volatile memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRegistry {
    entries: Entries,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Registry for InMemoryRegistry {
    fn add(&mut self, patch: FacePatch, identity: Identity) -> Result<()> {
        self.entries.insert(patch, identity)?;
        Ok(())
    }

    fn remove(&mut self, identity: &Identity) -> Result<()> {
        self.entries.remove(identity);
        Ok(())
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&FacePatch, &Identity)> + '_> {
        Box::new(self.entries.iter())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Deserialize)]
struct RegistryFile {
    version: u32,
    data: Vec<(FacePatch, Identity)>,
}

#[derive(Serialize)]
struct RegistryFileRef<'a> {
    version: u32,
    data: &'a [(FacePatch, Identity)],
}

/// Registry persisted to a single bincode file.
///
/// Every mutation rewrites the whole file. Only one process should hold the
/// file at a time; concurrent writers overwrite each other's snapshots.
#[derive(Debug)]
pub struct FileRegistry {
    path: PathBuf,
    entries: Entries,
}

impl FileRegistry {
    /// Open the registry at `path`. A missing file yields an empty registry.
    pub fn open(path: &Path) -> Result<Self> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No registry at {:?}, starting empty", path);
                return Ok(Self {
                    path: path.to_path_buf(),
                    entries: Entries::default(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let file: RegistryFile = bincode::deserialize(&data)
            .map_err(|e| FacesError::Storage(format!("Failed to deserialize {:?}: {}", path, e)))?;

        if file.version < STORAGE_VERSION {
            tracing::info!(
                "Registry {:?} has version {}, upgrading to {} on next write",
                path, file.version, STORAGE_VERSION
            );
        }

        tracing::debug!("Opened registry {:?} with {} entries", path, file.data.len());
        Ok(Self {
            path: path.to_path_buf(),
            entries: Entries(file.data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        let encoded = bincode::serialize(&RegistryFileRef {
            version: STORAGE_VERSION,
            data: &self.entries.0,
        })
        .map_err(|e| FacesError::Storage(format!("Failed to serialize: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file_name = self.path.file_name().ok_or_else(|| {
            FacesError::Storage(format!("Registry path {:?} has no file name", self.path))
        })?;
        let mut temp_name = file_name.to_os_string();
        temp_name.push(".tmp");
        let temp_path = self.path.with_file_name(temp_name);

        fs::write(&temp_path, encoded)?;
        fs::rename(&temp_path, &self.path)?;

        tracing::info!(path = ?self.path, count = self.entries.len(), "Saved registry");
        Ok(())
    }
}

impl Registry for FileRegistry {
    fn add(&mut self, patch: FacePatch, identity: Identity) -> Result<()> {
        if self.entries.insert(patch, identity)? {
            self.save()?;
        }
        Ok(())
    }

    fn remove(&mut self, identity: &Identity) -> Result<()> {
        let removed = self.entries.remove(identity);
        tracing::debug!("Removed {} faces of {:?}", removed, identity.as_str());
        if removed > 0 {
            self.save()?;
        }
        Ok(())
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&FacePatch, &Identity)> + '_> {
        Box::new(self.entries.iter())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rand::Rng;
    use std::collections::HashSet;

    const NAMES: [&str; 6] = [
        "eric idle",
        "graham chapman",
        "john cleese",
        "michael palin",
        "terry gilliam",
        "terry jones",
    ];

    fn random_patch(rng: &mut impl Rng) -> FacePatch {
        FacePatch::new(Array3::from_shape_fn((3, 8, 8), |_| rng.gen_range(-1.0..1.0)))
    }

    fn samples() -> Vec<(FacePatch, Identity)> {
        let mut rng = rand::thread_rng();
        NAMES
            .iter()
            .map(|name| (random_patch(&mut rng), Identity::from(*name)))
            .collect()
    }

    fn fill(registry: &mut dyn Registry, samples: &[(FacePatch, Identity)]) {
        for (patch, identity) in samples {
            registry.add(patch.clone(), identity.clone()).unwrap();
        }
    }

    fn contents(registry: &dyn Registry) -> Vec<(FacePatch, Identity)> {
        let mut pairs: Vec<_> = registry
            .iter()
            .map(|(patch, identity)| (patch.clone(), identity.clone()))
            .collect();
        pairs.sort_by(|a, b| a.1.cmp(&b.1));
        pairs
    }

    #[test]
    fn in_memory_add_and_len() {
        let mut registry = InMemoryRegistry::new();
        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());

        let samples = samples();
        fill(&mut registry, &samples);
        assert_eq!(registry.len(), 6);
        assert_eq!(contents(&registry), samples);
    }

    #[test]
    fn in_memory_remove_is_set_difference() {
        let mut registry = InMemoryRegistry::new();
        fill(&mut registry, &samples());

        registry.remove(&Identity::from("eric idle")).unwrap();
        registry.remove(&Identity::from("terry gilliam")).unwrap();
        registry.remove(&Identity::from("not in the database")).unwrap();
        assert_eq!(registry.len(), 4);

        let remaining: HashSet<_> = registry.iter().map(|(_, id)| id.as_str().to_string()).collect();
        assert!(!remaining.contains("eric idle"));
        assert!(!remaining.contains("terry gilliam"));
        assert!(remaining.contains("terry jones"));
    }

    #[test]
    fn remove_drops_every_patch_of_an_identity() {
        let mut rng = rand::thread_rng();
        let mut registry = InMemoryRegistry::new();
        for _ in 0..3 {
            registry.add(random_patch(&mut rng), Identity::from("alice")).unwrap();
        }
        registry.add(random_patch(&mut rng), Identity::from("bob")).unwrap();

        registry.remove(&Identity::from("alice")).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.summary().get(&Identity::from("bob")), Some(&1));
    }

    #[test]
    fn duplicate_add_is_idempotent() {
        let mut registry = InMemoryRegistry::new();
        let samples = samples();
        fill(&mut registry, &samples);

        // an independently built copy of the same values
        let copy = FacePatch::new(samples[0].0.view().to_owned());
        registry.add(copy, samples[0].1.clone()).unwrap();
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn conflicting_add_is_rejected_and_leaves_store_unchanged() {
        let mut registry = InMemoryRegistry::new();
        let samples = samples();
        fill(&mut registry, &samples);
        let before = contents(&registry);

        let err = registry
            .add(samples[0].0.clone(), Identity::from("new name"))
            .unwrap_err();
        match err {
            FacesError::Conflict { known_as } => {
                assert_eq!(known_as, BTreeSet::from([samples[0].1.clone()]));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(contents(&registry), before);
    }

    #[test]
    fn summary_groups_by_identity() {
        let mut rng = rand::thread_rng();
        let mut registry = InMemoryRegistry::new();
        registry.add(random_patch(&mut rng), Identity::from("alice")).unwrap();
        registry.add(random_patch(&mut rng), Identity::from("alice")).unwrap();
        registry.add(random_patch(&mut rng), Identity::from("bob")).unwrap();

        let summary = registry.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[&Identity::from("alice")], 2);
        assert_eq!(summary[&Identity::from("bob")], 1);
    }

    #[test]
    fn file_registry_opens_empty_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.bin");

        let registry = FileRegistry::open(&path).unwrap();
        assert_eq!(registry.len(), 0);
        // nothing is written until the first mutation
        assert!(!path.exists());
    }

    #[test]
    fn file_registry_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.bin");
        let samples = samples();

        let mut registry = FileRegistry::open(&path).unwrap();
        fill(&mut registry, &samples);
        assert!(path.exists());
        drop(registry);

        let reopened = FileRegistry::open(&path).unwrap();
        assert_eq!(reopened.len(), 6);
        assert_eq!(contents(&reopened), samples);
    }

    #[test]
    fn file_registry_add_conflict_and_idempotency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.bin");
        let samples = samples();

        let mut registry = FileRegistry::open(&path).unwrap();
        fill(&mut registry, &samples);

        let err = registry.add(samples[0].0.clone(), Identity::from("new name"));
        assert!(matches!(err, Err(FacesError::Conflict { .. })));

        registry.add(samples[0].0.clone(), samples[0].1.clone()).unwrap();
        assert_eq!(registry.len(), 6);

        let reloaded = FileRegistry::open(&path).unwrap();
        assert_eq!(contents(&reloaded), samples);
    }

    #[test]
    fn file_registry_remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.bin");

        let mut registry = FileRegistry::open(&path).unwrap();
        fill(&mut registry, &samples());
        registry.remove(&Identity::from("eric idle")).unwrap();
        registry.remove(&Identity::from("terry gilliam")).unwrap();
        registry.remove(&Identity::from("not in the database")).unwrap();
        assert_eq!(registry.len(), 4);

        let reloaded = FileRegistry::open(&path).unwrap();
        assert_eq!(reloaded.len(), 4);
        assert!(reloaded.iter().all(|(_, id)| id.as_str() != "eric idle"));
    }

    #[test]
    fn file_registry_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gallery").join("faces.bin");

        let mut registry = FileRegistry::open(&path).unwrap();
        let mut rng = rand::thread_rng();
        registry.add(random_patch(&mut rng), Identity::from("alice")).unwrap();
        assert!(path.exists());
        assert!(!path.with_file_name("faces.bin.tmp").exists());
    }

    #[test]
    fn unreadable_location_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"a regular file").unwrap();

        let err = FileRegistry::open(&blocker.join("faces.bin")).unwrap_err();
        assert!(matches!(err, FacesError::Io(_)));
    }

    #[test]
    fn idempotent_add_does_not_rewrite_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.bin");
        let samples = samples();

        let mut registry = FileRegistry::open(&path).unwrap();
        fill(&mut registry, &samples);
        std::fs::remove_file(&path).unwrap();

        registry.add(samples[0].0.clone(), samples[0].1.clone()).unwrap();
        assert!(!path.exists());

        let _ = registry.add(samples[1].0.clone(), Identity::from("new name"));
        assert!(!path.exists());
    }

    #[test]
    fn removing_an_unknown_identity_does_not_rewrite_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.bin");

        let mut registry = FileRegistry::open(&path).unwrap();
        fill(&mut registry, &samples());
        std::fs::remove_file(&path).unwrap();

        registry.remove(&Identity::from("not in the database")).unwrap();
        assert!(!path.exists());

        registry.remove(&Identity::from("eric idle")).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn older_version_is_upgraded_on_next_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.bin");
        let samples = samples();

        let legacy = bincode::serialize(&RegistryFileRef {
            version: 0,
            data: &samples[..2],
        })
        .unwrap();
        std::fs::write(&path, legacy).unwrap();

        let mut registry = FileRegistry::open(&path).unwrap();
        assert_eq!(registry.len(), 2);
        registry.add(samples[2].0.clone(), samples[2].1.clone()).unwrap();

        let file: RegistryFile = bincode::deserialize(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(file.version, STORAGE_VERSION);
        assert_eq!(file.data.len(), 3);
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.bin");
        std::fs::write(&path, b"not a registry").unwrap();

        let err = FileRegistry::open(&path).unwrap_err();
        assert!(matches!(err, FacesError::Storage(_)));
    }
}
