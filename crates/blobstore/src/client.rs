//! Serialize-push-share and fetch-read, the two calls behaviours use.

use crate::store::ContentStore;
use crate::BlobStoreError;
use anyhow::{anyhow, bail, Context};
use std::fs;
use std::path::Path;

/// Built-in serialization formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filetype {
    Json,
}

/// Object shape behaviours exchange.
pub type Artifact = serde_json::Value;

/// Application-supplied serializer: writes `Artifact` at the given path.
pub type CustomStorer = Box<dyn Fn(&Path, &Artifact) -> anyhow::Result<()>>;

/// Application-supplied deserializer: reads an `Artifact` from the path.
pub type CustomLoader = Box<dyn Fn(&Path) -> anyhow::Result<Artifact>>;

fn store_json(path: &Path, obj: &Artifact, multiple: bool) -> anyhow::Result<()> {
    if multiple {
        // One `<key>.json` per entry of the top-level object.
        let entries = obj
            .as_object()
            .ok_or_else(|| anyhow!("a multiple-file artifact must be a top-level object"))?;
        fs::create_dir_all(path).with_context(|| format!("creating `{}`", path.display()))?;
        for (name, value) in entries {
            let target = path.join(format!("{name}.json"));
            fs::write(&target, serde_json::to_vec_pretty(value)?)
                .with_context(|| format!("writing `{}`", target.display()))?;
        }
    } else {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating `{}`", parent.display()))?;
        }
        fs::write(path, serde_json::to_vec_pretty(obj)?)
            .with_context(|| format!("writing `{}`", path.display()))?;
    }
    Ok(())
}

fn load_json(path: &Path, multiple: bool) -> anyhow::Result<Artifact> {
    if multiple {
        let mut entries = serde_json::Map::new();
        for entry in fs::read_dir(path).with_context(|| format!("listing `{}`", path.display()))? {
            let entry = entry?;
            let file = entry.path();
            if file.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let stem = file
                .file_stem()
                .and_then(|stem| stem.to_str())
                .ok_or_else(|| anyhow!("`{}` has no usable file name", file.display()))?;
            let bytes =
                fs::read(&file).with_context(|| format!("reading `{}`", file.display()))?;
            entries.insert(stem.to_owned(), serde_json::from_slice(&bytes)?);
        }
        Ok(Artifact::Object(entries))
    } else {
        let bytes = fs::read(path).with_context(|| format!("reading `{}`", path.display()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn remove_path(path: &Path) -> anyhow::Result<()> {
    if path.is_file() {
        fs::remove_file(path).with_context(|| format!("removing `{}`", path.display()))?;
    } else if path.is_dir() {
        fs::remove_dir_all(path).with_context(|| format!("removing `{}`", path.display()))?;
    } else {
        bail!("`{}` is not an existing filepath!", path.display());
    }
    Ok(())
}

/// High-level interface behaviours use to exchange artifacts through a
/// content-addressed store.
pub struct BlobClient<S: ContentStore> {
    store: S,
}

impl<S: ContentStore> BlobClient<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Serialize `obj` at `path`, push it into the store, delete the local
    /// copy, and return the address to share through the chain.
    pub fn store_and_send(
        &self,
        path: &Path,
        obj: &Artifact,
        multiple: bool,
        filetype: Option<Filetype>,
        custom_storer: Option<&CustomStorer>,
    ) -> Result<String, BlobStoreError> {
        match (custom_storer, filetype) {
            (Some(storer), _) => storer(path, obj)?,
            (None, Some(Filetype::Json)) => store_json(path, obj, multiple)?,
            (None, None) => return Err(BlobStoreError::from(anyhow!("no storer was provided"))),
        }

        let result = self.store.add(path);
        // The local copy is scratch space either way.
        remove_path(path)?;
        result
    }

    /// Fetch the addressed content into `target_dir` and deserialize it.
    pub fn get_and_read(
        &self,
        address: &str,
        target_dir: &Path,
        multiple: bool,
        filename: Option<&str>,
        filetype: Option<Filetype>,
        custom_loader: Option<&CustomLoader>,
    ) -> Result<Artifact, BlobStoreError> {
        let filepath = if multiple {
            target_dir.to_path_buf()
        } else {
            let filename = filename.ok_or_else(|| {
                anyhow!("a filename must be given when downloading a single file")
            })?;
            target_dir.join(filename)
        };
        if filepath.exists() {
            remove_path(&filepath)?;
        }

        self.store.fetch(address, target_dir)?;

        let artifact = match (custom_loader, filetype) {
            (Some(loader), _) => loader(&filepath)?,
            (None, Some(Filetype::Json)) => load_json(&filepath, multiple)?,
            (None, None) => return Err(BlobStoreError::from(anyhow!("no loader was provided"))),
        };
        Ok(artifact)
    }
}
