use crate::common::{FaceCheckError, Result};
use crate::core::recognizer::{cosine_similarity, Embedding};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const INDEX_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
pub struct IndexEntry {
    /// Path of the reference image, relative to the database root.
    pub identity: String,
    pub embedding: Embedding,
}

#[derive(Serialize, Deserialize)]
pub struct FaceIndex {
    pub version: u32,
    pub entries: Vec<IndexEntry>,
}

impl FaceIndex {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self {
            version: INDEX_VERSION,
            entries,
        }
    }
}

/// Reference-image database: a directory of face images plus a bincode
/// index caching one embedding per image. The index is rebuilt explicitly
/// (`facecheck index-db`), not on demand.
pub struct FaceDb {
    root: PathBuf,
    index_path: PathBuf,
}

impl FaceDb {
    pub fn open(root: &Path, index_file: &str) -> Result<Self> {
        if !root.is_dir() {
            return Err(FaceCheckError::Database(format!(
                "Reference database directory not found: {}",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
            index_path: root.join(index_file),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All reference images under the root, sorted for stable indexing.
    pub fn scan_images(&self) -> Result<Vec<PathBuf>> {
        let mut images = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_file() && is_image_path(&path) {
                images.push(path);
            }
        }
        images.sort();
        Ok(images)
    }

    pub fn save(&self, index: &FaceIndex) -> Result<()> {
        let encoded = bincode::serialize(index)
            .map_err(|e| FaceCheckError::Database(format!("Failed to serialize index: {}", e)))?;
        fs::write(&self.index_path, encoded)?;
        Ok(())
    }

    pub fn load(&self) -> Result<FaceIndex> {
        if !self.index_path.exists() {
            return Err(FaceCheckError::Database(format!(
                "No embedding index at {}; run `facecheck index-db` first",
                self.index_path.display()
            )));
        }

        let data = fs::read(&self.index_path)?;
        let mut index: FaceIndex = bincode::deserialize(&data)
            .map_err(|e| FaceCheckError::Database(format!("Failed to deserialize index: {}", e)))?;

        // Handle version migration if needed
        if index.version < INDEX_VERSION {
            index.version = INDEX_VERSION;
        }

        Ok(index)
    }
}

/// Rank index entries against a probe embedding, best first, dropping
/// entries below the match threshold.
pub fn rank(index: &FaceIndex, probe: &[f32], threshold: f32) -> Vec<(String, f32)> {
    let mut matches: Vec<(String, f32)> = index
        .entries
        .iter()
        .map(|entry| (entry.identity.clone(), cosine_similarity(probe, &entry.embedding)))
        .filter(|(_, similarity)| *similarity >= threshold)
        .collect();
    matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    matches
}

fn is_image_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()),
        Some(ref ext) if ext == "jpg" || ext == "jpeg" || ext == "png"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "facecheck-dbtest-{}-{}",
            tag,
            std::process::id()
        ));
        if dir.exists() {
            fs::remove_dir_all(&dir).unwrap();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn scan_skips_non_image_files() {
        let root = temp_db_root("scan");
        fs::write(root.join("alice.jpg"), b"x").unwrap();
        fs::write(root.join("bob.PNG"), b"x").unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();

        let db = FaceDb::open(&root, "face_index.bincode").unwrap();
        let images = db.scan_images().unwrap();
        assert_eq!(images.len(), 2);

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn save_and_load_round_trip() {
        let root = temp_db_root("roundtrip");
        let db = FaceDb::open(&root, "face_index.bincode").unwrap();

        let index = FaceIndex::new(vec![IndexEntry {
            identity: "alice.jpg".into(),
            embedding: vec![0.1, 0.2, 0.3],
        }]);
        db.save(&index).unwrap();

        let loaded = db.load().unwrap();
        assert_eq!(loaded.version, INDEX_VERSION);
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].identity, "alice.jpg");

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn load_without_index_is_an_error() {
        let root = temp_db_root("missing");
        let db = FaceDb::open(&root, "face_index.bincode").unwrap();
        assert!(db.load().is_err());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn open_missing_root_is_an_error() {
        let root = std::env::temp_dir().join("facecheck-dbtest-does-not-exist");
        assert!(FaceDb::open(&root, "face_index.bincode").is_err());
    }

    #[test]
    fn rank_orders_by_similarity_and_filters() {
        let index = FaceIndex::new(vec![
            IndexEntry { identity: "far.jpg".into(), embedding: vec![0.0, 1.0] },
            IndexEntry { identity: "near.jpg".into(), embedding: vec![1.0, 0.1] },
            IndexEntry { identity: "exact.jpg".into(), embedding: vec![1.0, 0.0] },
        ]);
        let matches = rank(&index, &[1.0, 0.0], 0.5);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].0, "exact.jpg");
        assert_eq!(matches[1].0, "near.jpg");
    }
}
