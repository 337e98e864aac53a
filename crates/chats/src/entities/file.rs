use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generated identifier under which an uploaded blob is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(Uuid);

impl StorageKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a key received from a client. Anything that is not a UUID is
    /// rejected, so a key can never name a path outside the upload directory.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Metadata of a stored upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub storage_key: StorageKey,
    /// Sanitized client filename, for display only.
    pub original_filename: String,
    pub size_bytes: u64,
    pub content_type: String,
}

impl FileHandle {
    /// Retrieval path served by the gateway.
    pub fn url(&self) -> String {
        format!("/files/{}", self.storage_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_only_uuids() {
        let key = StorageKey::generate();
        assert_eq!(StorageKey::parse(&key.to_string()), Some(key));
        assert_eq!(StorageKey::parse("../secret"), None);
        assert_eq!(StorageKey::parse(""), None);
    }

    #[test]
    fn url_points_at_files_route() {
        let handle = FileHandle {
            storage_key: StorageKey::generate(),
            original_filename: "a.txt".to_string(),
            size_bytes: 1,
            content_type: "text/plain".to_string(),
        };
        assert_eq!(handle.url(), format!("/files/{}", handle.storage_key));
    }
}
