//! Checkpoint store
//!
//! Snapshots are addressed by (role, iteration): the training role names
//! the lineage ("direct" for the full-capacity run, "student" for the
//! distilled run) and the iteration pins the point in that lineage. Each
//! snapshot directory holds both model states as safetensors plus a JSON
//! metadata sidecar, and a per-role `latest.json` pointer tracks the most
//! recent snapshot. Writes go through a temporary path and a rename so a
//! crash never leaves a half-written snapshot under a live name.

use crate::error::{Error, Result};
use crate::model::StateDict;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Training lineage a snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Full-capacity model trained directly on the data.
    Direct,
    /// Reduced-capacity model trained by distillation.
    Student,
}

impl Role {
    /// Directory name for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Student => "student",
        }
    }
}

/// Which snapshot of a role to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotRef {
    /// Snapshot named by the role's latest pointer.
    Latest,
    /// Snapshot at an explicit iteration.
    Iteration(u64),
}

/// Sidecar metadata written next to every snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Role the snapshot was written under.
    pub role: String,
    /// Training iteration at snapshot time.
    pub iteration: u64,
    /// Capacity tier of the translator.
    pub tier: String,
    /// Label-set size of the classifier.
    pub n_classes: usize,
}

/// A loaded snapshot pair.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Translation model state.
    pub translator: StateDict,
    /// Classifier model state.
    pub classifier: StateDict,
    /// Sidecar metadata.
    pub meta: CheckpointMeta,
}

#[derive(Debug, Serialize, Deserialize)]
struct LatestPointer {
    iteration: u64,
}

/// Filesystem-backed store of (role, iteration) snapshots.
#[derive(Debug)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    /// Open a store rooted at `root`; the directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory of one snapshot.
    pub fn snapshot_dir(&self, role: Role, iteration: u64) -> PathBuf {
        self.root.join(role.as_str()).join(format!("iter-{iteration:07}"))
    }

    /// Write a snapshot pair atomically and advance the latest pointer.
    pub fn save_pair(
        &self,
        role: Role,
        iteration: u64,
        translator: &StateDict,
        classifier: &StateDict,
        meta: &CheckpointMeta,
    ) -> Result<PathBuf> {
        let role_dir = self.root.join(role.as_str());
        fs::create_dir_all(&role_dir)
            .map_err(|e| Error::io(format!("creating {}", role_dir.display()), e))?;

        let final_dir = self.snapshot_dir(role, iteration);
        let tmp_dir = role_dir.join(format!(".tmp-iter-{iteration:07}"));
        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)
                .map_err(|e| Error::io(format!("clearing {}", tmp_dir.display()), e))?;
        }
        fs::create_dir_all(&tmp_dir)
            .map_err(|e| Error::io(format!("creating {}", tmp_dir.display()), e))?;

        write_safetensors(&tmp_dir.join("translator.safetensors"), translator)?;
        write_safetensors(&tmp_dir.join("classifier.safetensors"), classifier)?;

        let meta_json = serde_json::to_string_pretty(meta)
            .map_err(|e| Error::Serialization(format!("encoding checkpoint metadata: {e}")))?;
        fs::write(tmp_dir.join("meta.json"), meta_json)
            .map_err(|e| Error::io(format!("writing {}", tmp_dir.display()), e))?;

        if final_dir.exists() {
            fs::remove_dir_all(&final_dir)
                .map_err(|e| Error::io(format!("replacing {}", final_dir.display()), e))?;
        }
        fs::rename(&tmp_dir, &final_dir)
            .map_err(|e| Error::io(format!("publishing {}", final_dir.display()), e))?;

        self.write_latest(role, iteration)?;
        Ok(final_dir)
    }

    /// Load a snapshot pair.
    pub fn load_pair(&self, role: Role, which: SnapshotRef) -> Result<Snapshot> {
        let iteration = match which {
            SnapshotRef::Iteration(i) => i,
            SnapshotRef::Latest => self.read_latest(role)?,
        };
        let dir = self.snapshot_dir(role, iteration);
        if !dir.is_dir() {
            return Err(Error::checkpoint(
                &dir,
                format!("no {} snapshot at iteration {iteration}", role.as_str()),
            ));
        }

        let translator = read_safetensors(&dir.join("translator.safetensors"))?;
        let classifier = read_safetensors(&dir.join("classifier.safetensors"))?;

        let meta_path = dir.join("meta.json");
        let meta_text = fs::read_to_string(&meta_path)
            .map_err(|e| Error::io(format!("reading {}", meta_path.display()), e))?;
        let meta: CheckpointMeta = serde_json::from_str(&meta_text)
            .map_err(|e| Error::Serialization(format!("decoding checkpoint metadata: {e}")))?;

        Ok(Snapshot { translator, classifier, meta })
    }

    /// Iteration the role's latest pointer names, if any snapshot exists.
    pub fn latest_iteration(&self, role: Role) -> Option<u64> {
        self.read_latest(role).ok()
    }

    fn latest_path(&self, role: Role) -> PathBuf {
        self.root.join(role.as_str()).join("latest.json")
    }

    fn write_latest(&self, role: Role, iteration: u64) -> Result<()> {
        let path = self.latest_path(role);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string(&LatestPointer { iteration })
            .map_err(|e| Error::Serialization(format!("encoding latest pointer: {e}")))?;
        fs::write(&tmp, body).map_err(|e| Error::io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .map_err(|e| Error::io(format!("publishing {}", path.display()), e))?;
        Ok(())
    }

    fn read_latest(&self, role: Role) -> Result<u64> {
        let path = self.latest_path(role);
        let text = fs::read_to_string(&path).map_err(|e| {
            Error::checkpoint(&path, format!("no latest pointer for role {}: {e}", role.as_str()))
        })?;
        let pointer: LatestPointer = serde_json::from_str(&text)
            .map_err(|e| Error::Serialization(format!("decoding latest pointer: {e}")))?;
        Ok(pointer.iteration)
    }
}

fn write_safetensors(path: &Path, dict: &StateDict) -> Result<()> {
    let views: Vec<(String, TensorView<'_>)> = dict
        .iter()
        .map(|(name, entry)| {
            let view =
                TensorView::new(Dtype::F32, entry.shape.clone(), bytemuck::cast_slice(&entry.data))
                    .map_err(|e| Error::checkpoint(path, format!("building view '{name}': {e:?}")))?;
            Ok((name.clone(), view))
        })
        .collect::<Result<_>>()?;

    let bytes = safetensors::serialize(views, &None)
        .map_err(|e| Error::checkpoint(path, format!("serializing: {e}")))?;
    fs::write(path, bytes).map_err(|e| Error::io(format!("writing {}", path.display()), e))
}

fn read_safetensors(path: &Path) -> Result<StateDict> {
    let bytes =
        fs::read(path).map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
    let tensors = SafeTensors::deserialize(&bytes)
        .map_err(|e| Error::checkpoint(path, format!("deserializing: {e}")))?;

    let mut dict = StateDict::new();
    for (name, view) in tensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(Error::checkpoint(
                path,
                format!("tensor '{name}' has dtype {:?}, expected F32", view.dtype()),
            ));
        }
        // Byte buffers from the file are not alignment-guaranteed.
        let data: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
        dict.insert(name, view.shape().to_vec(), data);
    }
    Ok(dict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_states() -> (StateDict, StateDict) {
        let mut translator = StateDict::new();
        translator.insert("layers.0.weight", vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        translator.insert("layers.0.bias", vec![2, 2], vec![0.1, 0.2, 0.3, 0.4]);
        let mut classifier = StateDict::new();
        classifier.insert("fc.weight", vec![2, 4], vec![0.0; 8]);
        classifier.insert("fc.bias", vec![2], vec![0.5, -0.5]);
        (translator, classifier)
    }

    fn meta(role: Role, iteration: u64) -> CheckpointMeta {
        CheckpointMeta {
            role: role.as_str().to_string(),
            iteration,
            tier: "teacher".to_string(),
            n_classes: 2,
        }
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let (translator, classifier) = sample_states();

        store.save_pair(Role::Direct, 500, &translator, &classifier, &meta(Role::Direct, 500))
            .unwrap();
        let snapshot = store.load_pair(Role::Direct, SnapshotRef::Iteration(500)).unwrap();

        assert_eq!(snapshot.translator, translator);
        assert_eq!(snapshot.classifier, classifier);
        assert_eq!(snapshot.meta.iteration, 500);
        assert_eq!(snapshot.meta.role, "direct");
    }

    #[test]
    fn test_latest_pointer_tracks_most_recent() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let (translator, classifier) = sample_states();

        store.save_pair(Role::Direct, 500, &translator, &classifier, &meta(Role::Direct, 500))
            .unwrap();
        store.save_pair(Role::Direct, 1000, &translator, &classifier, &meta(Role::Direct, 1000))
            .unwrap();

        assert_eq!(store.latest_iteration(Role::Direct), Some(1000));
        let snapshot = store.load_pair(Role::Direct, SnapshotRef::Latest).unwrap();
        assert_eq!(snapshot.meta.iteration, 1000);
    }

    #[test]
    fn test_roles_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let (translator, classifier) = sample_states();

        store.save_pair(Role::Direct, 100, &translator, &classifier, &meta(Role::Direct, 100))
            .unwrap();
        store.save_pair(Role::Student, 200, &translator, &classifier, &meta(Role::Student, 200))
            .unwrap();

        assert_eq!(store.latest_iteration(Role::Direct), Some(100));
        assert_eq!(store.latest_iteration(Role::Student), Some(200));
    }

    #[test]
    fn test_missing_snapshot_is_checkpoint_error() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());

        let err = store.load_pair(Role::Student, SnapshotRef::Latest).unwrap_err();
        assert_eq!(err.stage(), "checkpoint");

        let err = store.load_pair(Role::Direct, SnapshotRef::Iteration(42)).unwrap_err();
        assert!(matches!(err, Error::Checkpoint { .. }));
    }

    #[test]
    fn test_no_temporary_leftovers_after_save() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let (translator, classifier) = sample_states();

        store.save_pair(Role::Direct, 1, &translator, &classifier, &meta(Role::Direct, 1)).unwrap();

        let role_dir = dir.path().join("direct");
        let leftovers: Vec<_> = fs::read_dir(&role_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temporary entries remain: {leftovers:?}");
    }

    #[test]
    fn test_overwrite_same_iteration() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let (mut translator, classifier) = sample_states();

        store.save_pair(Role::Direct, 7, &translator, &classifier, &meta(Role::Direct, 7)).unwrap();
        translator.insert("layers.0.weight", vec![2, 2], vec![9.0, 9.0, 9.0, 9.0]);
        store.save_pair(Role::Direct, 7, &translator, &classifier, &meta(Role::Direct, 7)).unwrap();

        let snapshot = store.load_pair(Role::Direct, SnapshotRef::Iteration(7)).unwrap();
        assert_eq!(snapshot.translator.get("layers.0.weight").unwrap().data, vec![9.0; 4]);
    }
}
