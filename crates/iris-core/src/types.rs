use serde::{Deserialize, Serialize};

/// Metadata stored alongside every indexed image vector and returned by the
/// browse and search endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    /// Root-relative URL under which the source file is served, derived from
    /// the source folder name and the file name (`/<folder>/<filename>`).
    pub path: String,
    /// Original file name, including extension.
    pub filename: String,
}

impl ImagePayload {
    /// Build a payload for a file inside the given source folder.
    pub fn new(folder: &str, filename: &str) -> Self {
        Self {
            path: format!("/{}/{}", folder, filename),
            filename: filename.to_string(),
        }
    }
}
