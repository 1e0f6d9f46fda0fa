//! Payloads and route names shared by client and server.

use serde::{Deserialize, Serialize};

pub const ROOT: &str = "/";
pub const HEALTH: &str = "/health";
pub const UPLOAD_FILE: &str = "/uploadfile";
pub const DELETE_FILE: &str = "/deletefile";
pub const DELETE_DIRECTORY: &str = "/deletedirectory";
pub const RENAME_FILE: &str = "/renamefile";
pub const RENAME_DIRECTORY: &str = "/renamedirectory";
pub const CREATE_DIRECTORY: &str = "/createdirectory";

/// Multipart field carrying the file bytes.
pub const FILE_FIELD: &str = "file";
/// Multipart/form/query field carrying the relative path.
pub const SUB_PATH_FIELD: &str = "subPath";

/// Successful mutation acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub message: String,
    /// Relative paths touched by the mutation.
    #[serde(default)]
    pub paths: Vec<String>,
}

impl Ack {
    pub fn new(message: impl Into<String>, paths: Vec<String>) -> Self {
        Self {
            message: message.into(),
            paths,
        }
    }
}

/// Error body returned for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Liveness payload for `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    pub message: String,
}

impl Default for Greeting {
    fn default() -> Self {
        Self {
            message: "Hello World".to_string(),
        }
    }
}

/// `subPath` as a query parameter or urlencoded form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubPathForm {
    #[serde(rename = "subPath")]
    pub sub_path: String,
}

/// Old and new paths for the rename endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameForm {
    #[serde(rename = "oldSubPath")]
    pub old_sub_path: String,
    #[serde(rename = "newSubPath")]
    pub new_sub_path: String,
}
