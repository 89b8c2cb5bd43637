use std::path::{Path, PathBuf};

use super::document::OwnerId;

pub const INDEX_FILE: &str = "index.vec";
pub const MAPPING_FILE: &str = "mapping.json";

/// On-disk layout of persisted indices: `<root>/indices/user_<owner>/`
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
    pub indices: PathBuf,
}

impl IndexPaths {
    pub fn from_root(root: PathBuf) -> Self {
        Self {
            indices: root.join("indices"),
            root,
        }
    }

    pub fn owner_dir(&self, owner: OwnerId) -> PathBuf {
        self.indices.join(format!("user_{}", owner))
    }

    pub fn index_file(&self, owner: OwnerId) -> PathBuf {
        self.owner_dir(owner).join(INDEX_FILE)
    }

    pub fn mapping_file(&self, owner: OwnerId) -> PathBuf {
        self.owner_dir(owner).join(MAPPING_FILE)
    }
}

/// Sibling path used while an artifact is being written
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
