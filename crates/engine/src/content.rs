//! Content store seam. Uploaded files go to a store that hands back an opaque
//! [`ContentRef`]; the database only ever holds that reference.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use formstack_core::{ContentRef, Upload};

const UPLOAD_PREFIX: &str = "formfiles";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid content reference: {0}")]
    InvalidRef(String),
}

pub trait ContentStore {
    /// Store an upload and return a stable reference to it.
    fn put(&mut self, upload: &Upload) -> Result<ContentRef, ContentError>;

    fn get(&self, reference: &ContentRef) -> Result<Option<Vec<u8>>, ContentError>;

    /// Location a client can fetch the content from.
    fn url(&self, reference: &ContentRef) -> Option<String>;
}

/// References are `formfiles/<blake3 hex><ext>`, so identical uploads share
/// one stored copy.
fn reference_for(upload: &Upload) -> ContentRef {
    let ext = upload.extension().unwrap_or("");
    ContentRef::new(format!("{UPLOAD_PREFIX}/{}{ext}", upload.digest()))
}

fn check_reference(reference: &ContentRef) -> Result<&str, ContentError> {
    let name = reference
        .as_str()
        .strip_prefix(UPLOAD_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| ContentError::InvalidRef(reference.to_string()))?;
    let well_formed = !name.is_empty()
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.');
    if !well_formed {
        return Err(ContentError::InvalidRef(reference.to_string()));
    }
    Ok(name)
}

#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: HashMap<ContentRef, Vec<u8>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl ContentStore for MemoryContentStore {
    fn put(&mut self, upload: &Upload) -> Result<ContentRef, ContentError> {
        let reference = reference_for(upload);
        self.blobs
            .entry(reference.clone())
            .or_insert_with(|| upload.bytes.clone());
        Ok(reference)
    }

    fn get(&self, reference: &ContentRef) -> Result<Option<Vec<u8>>, ContentError> {
        Ok(self.blobs.get(reference).cloned())
    }

    fn url(&self, reference: &ContentRef) -> Option<String> {
        self.blobs
            .contains_key(reference)
            .then(|| format!("memory://{reference}"))
    }
}

/// Files under `<root>/formfiles/`.
#[derive(Debug)]
pub struct DirContentStore {
    root: PathBuf,
}

impl DirContentStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ContentError> {
        let root = root.into();
        fs::create_dir_all(root.join(UPLOAD_PREFIX))?;
        Ok(Self { root })
    }

    fn path_of(&self, reference: &ContentRef) -> Result<PathBuf, ContentError> {
        let name = check_reference(reference)?;
        Ok(self.root.join(UPLOAD_PREFIX).join(name))
    }
}

impl ContentStore for DirContentStore {
    fn put(&mut self, upload: &Upload) -> Result<ContentRef, ContentError> {
        let reference = reference_for(upload);
        let path = self.path_of(&reference)?;
        if !path.exists() {
            fs::write(&path, &upload.bytes)?;
            debug!(path = %path.display(), len = upload.bytes.len(), "stored upload");
        }
        Ok(reference)
    }

    fn get(&self, reference: &ContentRef) -> Result<Option<Vec<u8>>, ContentError> {
        let path = self.path_of(reference)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, reference: &ContentRef) -> Option<String> {
        let path = self.path_of(reference).ok()?;
        path.exists().then(|| format!("file://{}", path.display()))
    }
}
