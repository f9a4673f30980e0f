//! Content-addressed backends.

use crate::BlobStoreError;
use anyhow::{anyhow, Context};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Named flat file set: a single artifact file, or a directory of them.
type Files = BTreeMap<String, Vec<u8>>;

/// Content-addressed artifact store.
///
/// `add` reads the file or directory at `path` and returns its address;
/// `fetch` materializes the addressed content under `target_dir`, keeping
/// the original file names.
pub trait ContentStore {
    fn add(&self, path: &Path) -> Result<String, BlobStoreError>;
    fn fetch(&self, address: &str, target_dir: &Path) -> Result<(), BlobStoreError>;
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("`{}` has no usable file name", path.display()))
}

fn snapshot(path: &Path) -> anyhow::Result<Files> {
    let mut files = Files::new();
    if path.is_file() {
        let bytes = fs::read(path).with_context(|| format!("reading `{}`", path.display()))?;
        files.insert(file_name(path)?, bytes);
    } else if path.is_dir() {
        for entry in fs::read_dir(path).with_context(|| format!("listing `{}`", path.display()))? {
            let entry = entry?;
            if entry.path().is_file() {
                let bytes = fs::read(entry.path())
                    .with_context(|| format!("reading `{}`", entry.path().display()))?;
                files.insert(file_name(&entry.path())?, bytes);
            }
        }
    } else {
        return Err(anyhow!("`{}` is not an existing filepath!", path.display()));
    }
    Ok(files)
}

/// Address of a file set: one digest over names and contents, in name
/// order, so identical content always yields the same address.
fn address_of(files: &Files) -> String {
    let mut hasher = blake3::Hasher::new();
    for (name, bytes) in files {
        hasher.update(&(name.len() as u64).to_be_bytes());
        hasher.update(name.as_bytes());
        hasher.update(&(bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }
    hex::encode(hasher.finalize().as_bytes())
}

fn materialize(files: &Files, target_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(target_dir)
        .with_context(|| format!("creating `{}`", target_dir.display()))?;
    for (name, bytes) in files {
        let target = target_dir.join(name);
        fs::write(&target, bytes).with_context(|| format!("writing `{}`", target.display()))?;
    }
    Ok(())
}

/// In-memory backend; the default for tests and single-process runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Files>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContentStore for MemoryStore {
    fn add(&self, path: &Path) -> Result<String, BlobStoreError> {
        let files = snapshot(path)?;
        let address = address_of(&files);
        debug!("stored {} file(s) at {}", files.len(), address);
        self.entries.write().insert(address.clone(), files);
        Ok(address)
    }

    fn fetch(&self, address: &str, target_dir: &Path) -> Result<(), BlobStoreError> {
        let entries = self.entries.read();
        let files = entries
            .get(address)
            .ok_or_else(|| anyhow!("unknown address: {address}"))?;
        materialize(files, target_dir)?;
        Ok(())
    }
}

/// Directory-backed store standing in for a remote content-addressed node:
/// every artifact lives under `<root>/<address>/`.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, BlobStoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating store root `{}`", root.display()))?;
        Ok(Self { root })
    }
}

impl ContentStore for LocalStore {
    fn add(&self, path: &Path) -> Result<String, BlobStoreError> {
        let files = snapshot(path)?;
        let address = address_of(&files);
        materialize(&files, &self.root.join(&address))?;
        debug!("stored {} file(s) at {}", files.len(), address);
        Ok(address)
    }

    fn fetch(&self, address: &str, target_dir: &Path) -> Result<(), BlobStoreError> {
        let source = self.root.join(address);
        if !source.is_dir() {
            return Err(BlobStoreError::from(anyhow!("unknown address: {address}")));
        }
        let files = snapshot(&source)?;
        materialize(&files, target_dir)?;
        Ok(())
    }
}
