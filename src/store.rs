//! Single-value slots for state that outlives one query: the cached event
//! list and the clock override.

use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub trait Store<T>: Send + Sync {
    /// # Errors
    /// Returns an error if the backing cannot be read.
    fn get(&self) -> Result<Option<T>>;

    /// Replaces the held value as a whole.
    ///
    /// # Errors
    /// Returns an error if the backing cannot be written.
    fn set(&self, value: T) -> Result<()>;

    /// # Errors
    /// Returns an error if the backing cannot be written.
    fn clear(&self) -> Result<()>;
}

#[derive(Debug)]
pub struct MemoryStore<T> {
    slot: RwLock<Option<T>>,
}

impl<T> MemoryStore<T> {
    pub const fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    pub const fn with(value: T) -> Self {
        Self {
            slot: RwLock::new(Some(value)),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Store<T> for MemoryStore<T>
where
    T: Clone + Send + Sync,
{
    fn get(&self) -> Result<Option<T>> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        Ok(slot.clone())
    }

    fn set(&self, value: T) -> Result<()> {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// A JSON file. Writes go to a sibling temp file that is then renamed over
/// the target, so readers see either the old or the new value.
#[derive(Debug)]
pub struct FileStore<T> {
    path: PathBuf,
    _value: PhantomData<fn() -> T>,
}

impl<T> FileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _value: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl<T> Store<T> for FileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn get(&self) -> Result<Option<T>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_str(&content)?))
    }

    fn set(&self, value: T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let temp = self.temp_path();
        std::fs::write(&temp, serde_json::to_vec_pretty(&value)?)?;
        std::fs::rename(&temp, &self.path)?;

        log::debug!(component = "store"; "wrote {}", self.path.display());

        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
