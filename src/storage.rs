use std::fs::File;
use std::io::{Read, Result, Write};
use std::path::Path;

use fs2::FileExt;
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;

// JSON-file record store plumbing. Each collection is one JSON array on
// disk; writes go through a temp file + rename so a crash mid-write never
// leaves a torn collection behind.

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    let data = serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(data)
}

pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;

    let json = serde_json::to_string_pretty(data)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    tmp.write_all(json.as_bytes())?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    tmp.persist(path)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(())
}

/// Exclusive advisory lock over a collection file, released on drop. Both
/// timer-driven workflows append to the same collections, so every
/// read-modify-write cycle takes the lock first.
pub struct FileLock {
    file: File,
}

impl FileLock {
    pub fn new(path: &Path) -> Result<Self> {
        let lock_path = path.with_extension("lock");
        let file = File::create(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trips_a_collection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("posts.json");

        let items = vec!["one".to_string(), "two".to_string()];
        atomic_write_json(&path, &items).unwrap();

        let back: Vec<String> = read_json(&path).unwrap();
        assert_eq!(back, items);
    }

    #[test]
    fn missing_file_is_an_error_not_a_panic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");
        assert!(read_json::<Vec<String>>(&path).is_err());
    }

    #[test]
    fn lock_can_be_retaken_after_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comments.json");
        {
            let _lock = FileLock::new(&path).unwrap();
        }
        let _lock = FileLock::new(&path).unwrap();
    }
}
