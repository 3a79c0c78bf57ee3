/// Spec store adapter: the thin boundary to the durable name -> blob
/// map. The engine writes through on every spec change and reads the
/// whole map back once at startup. Blob encoding is opaque here.
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub trait SpecStore: Send + Sync + std::fmt::Debug {
    fn load_all(&self) -> Result<Vec<(String, Vec<u8>)>>;
    fn save(&self, name: &str, blob: &[u8]) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;
}

const BLOB_SUFFIX: &str = ".spec";

/// One blob file per container under a spool directory. Writes go
/// through a temp file and rename so a crash never leaves a torn blob.
#[derive(Debug)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn open(dir: &Path) -> Result<FsStore> {
        fs::create_dir_all(dir)
            .map_err(|e| Error::from_io(&format!("mkdir {}", dir.display()), e))?;
        Ok(FsStore { dir: dir.to_path_buf() })
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", name, BLOB_SUFFIX))
    }
}

impl SpecStore for FsStore {
    fn load_all(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| Error::from_io(&format!("read_dir {}", self.dir.display()), e))?;

        let mut blobs = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| Error::from_io(&format!("read_dir {}", self.dir.display()), e))?;
            let file_name = entry.file_name();
            let Some(name) = file_name
                .to_str()
                .and_then(|f| f.strip_suffix(BLOB_SUFFIX))
            else {
                continue;
            };

            // A single unreadable blob must not block daemon startup.
            match fs::read(entry.path()) {
                Ok(blob) => blobs.push((name.to_string(), blob)),
                Err(e) => {
                    log::warn!("skipping spec blob {}: {}", entry.path().display(), e)
                }
            }
        }

        blobs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(blobs)
    }

    fn save(&self, name: &str, blob: &[u8]) -> Result<()> {
        let target = self.blob_path(name);
        let tmp = self.dir.join(format!(".{}.tmp", name));
        fs::write(&tmp, blob)
            .map_err(|e| Error::from_io(&format!("write {}", tmp.display()), e))?;
        fs::rename(&tmp, &target)
            .map_err(|e| Error::from_io(&format!("rename {}", target.display()), e))
    }

    fn remove(&self, name: &str) -> Result<()> {
        let target = self.blob_path(name);
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from_io(&format!("unlink {}", target.display()), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store(name: &str) -> FsStore {
        let dir = std::env::temp_dir().join("corral-store-tests").join(name);
        let _ = fs::remove_dir_all(&dir);
        FsStore::open(&dir).unwrap()
    }

    #[test]
    fn save_load_remove_roundtrip() {
        let store = scratch_store("roundtrip");
        store.save("web", b"blob-a").unwrap();
        store.save("db", b"blob-b").unwrap();
        store.save("web", b"blob-a2").unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(
            all,
            vec![
                ("db".to_string(), b"blob-b".to_vec()),
                ("web".to_string(), b"blob-a2".to_vec()),
            ]
        );

        store.remove("db").unwrap();
        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "web");
    }

    #[test]
    fn remove_missing_is_ok() {
        let store = scratch_store("remove-missing");
        store.remove("ghost").unwrap();
    }

    #[test]
    fn load_all_ignores_foreign_files() {
        let store = scratch_store("foreign");
        store.save("kept", b"x").unwrap();
        fs::write(store.dir.join("README"), b"not a blob").unwrap();
        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "kept");
    }

    #[test]
    fn open_twice_is_fine() {
        let dir = std::env::temp_dir().join("corral-store-tests").join("reopen");
        let _ = fs::remove_dir_all(&dir);
        FsStore::open(&dir).unwrap();
        FsStore::open(&dir).unwrap();
    }
}
