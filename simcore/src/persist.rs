use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

/// Layout of published artifacts under one root, one directory per
/// partition key:
///
/// ```text
/// <root>/<key>/vocabulary.bin
/// <root>/<key>/index/manifest.json
/// <root>/<key>/index/shard.<n>.bin
/// <root>/<key>/index/ordinals.json
/// ```
pub struct ArtifactPaths {
    pub root: PathBuf,
}

impl ArtifactPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn partition(&self, key: &str) -> PathBuf { self.root.join(key) }
    pub fn vocabulary(&self, key: &str) -> PathBuf { self.partition(key).join("vocabulary.bin") }
    pub fn index_dir(&self, key: &str) -> PathBuf { self.partition(key).join("index") }
    pub fn ordinals(&self, key: &str) -> PathBuf { ordinals_in(&self.index_dir(key)) }
}

pub fn ordinals_in(index_dir: &Path) -> PathBuf { index_dir.join("ordinals.json") }

/// Join non-empty parts into a partition key, e.g. `acme-news-unabridged`.
pub fn partition_key<S: AsRef<str>>(parts: &[S]) -> Result<String> {
    let parts: Vec<&str> = parts.iter().map(|p| p.as_ref()).filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return Err(Error::MalformedInput("empty partition key".into()));
    }
    let key = parts.join("-");
    if key.contains(['/', '\\']) || key.starts_with('.') {
        return Err(Error::MalformedInput(format!("partition key {key:?} is not a plain name")));
    }
    Ok(key)
}

/// Write through a temporary file in the same directory, then rename over
/// `path` so readers never see a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

pub fn save_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = bincode::serialize(value)?;
    write_atomic(path, &bytes)
}

pub fn load_bincode<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let buf = read_artifact(path)?;
    bincode::deserialize(&buf).map_err(|e| Error::persistence(path, format!("corrupt artifact: {e}")))
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let buf = read_artifact(path)?;
    serde_json::from_slice(&buf).map_err(|e| Error::persistence(path, format!("corrupt artifact: {e}")))
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    let mut f = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::persistence(path, "artifact missing"),
        _ => Error::Io(e),
    })?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(buf)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Scratch directory created next to `target`, removed on drop unless
/// published.
pub fn staging_dir_for(target: &Path) -> Result<TempDir> {
    let dir = parent_dir(target);
    fs::create_dir_all(dir)?;
    Ok(tempfile::Builder::new().prefix(".staging-").tempdir_in(dir)?)
}

/// Move a fully written staging directory into `target`, retiring whatever
/// was published there before.
///
/// The old directory is renamed aside first, so a reader racing the swap sees
/// either the old set, the new set, or a missing directory (a load error),
/// never a mix of both.
pub fn publish_dir(staging: TempDir, target: &Path) -> Result<()> {
    let retired = target.with_file_name(format!(
        ".retired-{}",
        target.file_name().and_then(|n| n.to_str()).unwrap_or("artifact")
    ));
    if retired.exists() {
        fs::remove_dir_all(&retired)?;
    }
    let had_previous = target.exists();
    if had_previous {
        fs::rename(target, &retired)?;
    }
    fs::rename(staging.path(), target)?;
    if had_previous {
        fs::remove_dir_all(&retired)?;
    }
    tracing::info!(target = %target.display(), "published artifacts");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partition_keys_join_parts() {
        assert_eq!(partition_key(&["acme", "news", "unabridged"]).unwrap(), "acme-news-unabridged");
        assert_eq!(partition_key(&["acme", "", "v2"]).unwrap(), "acme-v2");
        assert!(partition_key::<&str>(&[]).is_err());
        assert!(partition_key(&["../etc"]).is_err());
    }

    #[test]
    fn missing_artifact_is_a_persistence_failure() {
        let dir = tempdir().unwrap();
        let err = load_json::<Vec<u32>>(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
    }

    #[test]
    fn corrupt_artifact_is_a_persistence_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        fs::write(&path, b"\x01").unwrap();
        let err = load_bincode::<Vec<String>>(&path).unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
    }

    #[test]
    fn publish_replaces_previous_directory() {
        let root = tempdir().unwrap();
        let target = root.path().join("index");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("old.txt"), "old").unwrap();

        let staging = staging_dir_for(&target).unwrap();
        fs::write(staging.path().join("new.txt"), "new").unwrap();
        publish_dir(staging, &target).unwrap();

        assert!(target.join("new.txt").exists());
        assert!(!target.join("old.txt").exists());
        let leftovers: Vec<_> = fs::read_dir(root.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn dropped_staging_leaves_nothing_behind() {
        let root = tempdir().unwrap();
        let target = root.path().join("index");
        {
            let staging = staging_dir_for(&target).unwrap();
            fs::write(staging.path().join("partial.bin"), "x").unwrap();
        }
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
