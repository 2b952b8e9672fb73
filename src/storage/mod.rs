pub mod face_db;

pub use face_db::{FaceDb, FaceIndex, IndexEntry};
