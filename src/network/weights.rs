use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Serialize, Deserialize};
use tempfile::NamedTempFile;

use crate::math::tensor::Tensor;

pub const WEIGHTS_FORMAT_VERSION: u32 = 1;

/// On-disk parameter snapshot: layer path → tensor, bincode-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightBlob {
    pub format_version: u32,
    pub tensors: BTreeMap<String, Tensor>,
}

impl WeightBlob {
    pub fn new(tensors: BTreeMap<String, Tensor>) -> WeightBlob {
        WeightBlob { format_version: WEIGHTS_FORMAT_VERSION, tensors }
    }

    /// Writes the blob to `path` and syncs it to disk before returning.
    ///
    /// Each call stages its bytes in its own temp file next to `path` and
    /// renames it over the target, so readers never observe a half-written
    /// snapshot and concurrent writers of one path do not collide.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let dir = path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            bincode::serialize_into(&mut writer, self)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<WeightBlob, bincode::Error> {
        let file = File::open(path).map_err(|e| Box::new(bincode::ErrorKind::Io(e)))?;
        bincode::deserialize_from(BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_preserves_tensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("7_m1.weights");
        let mut tensors = BTreeMap::new();
        tensors.insert("layers.0.weight".to_owned(), Tensor::from_vec(&[1, 2], vec![0.25, -1.5]).unwrap());
        let blob = WeightBlob::new(tensors);

        blob.write_to(&path).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "staging file left behind");
        assert_eq!(WeightBlob::read_from(&path).unwrap(), blob);
    }

    #[test]
    fn concurrent_writers_of_one_path_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1_shared.weights");
        let blobs: Vec<WeightBlob> = (0..6)
            .map(|i| {
                let mut tensors = BTreeMap::new();
                tensors.insert("layers.0.weight".to_owned(), Tensor::from_slice(&vec![i as f64; 20_000]));
                WeightBlob::new(tensors)
            })
            .collect();

        std::thread::scope(|s| {
            for blob in &blobs {
                let path = &path;
                s.spawn(move || blob.write_to(path).unwrap());
            }
        });

        let stored = WeightBlob::read_from(&path).unwrap();
        assert!(blobs.contains(&stored));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_rename_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("7_m.weights");
        std::fs::create_dir(&path).unwrap();

        assert!(WeightBlob::new(BTreeMap::new()).write_to(&path).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = WeightBlob::read_from(&dir.path().join("absent.weights")).unwrap_err();
        assert!(matches!(*err, bincode::ErrorKind::Io(_)));
    }
}
