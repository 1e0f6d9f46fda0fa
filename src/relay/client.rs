//! HTTP client for the mirror server.
//!
//! One request per [`ChangeOperation`]. Responses are reported, never retried:
//! a failed mutation is logged and the relay moves on to the next event.

use crate::relay::transfer::Payload;
use crate::relay::RelayError;
use reqwest::multipart::Form;
use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use tracing::{debug, error, info, warn};
use treemirror_types::wire::{self, FILE_FIELD, SUB_PATH_FIELD};
use treemirror_types::{ChangeOperation, EntryKind, RelativePath, RenameForm, SubPathForm};

/// What the server said about one relayed operation.
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub action: &'static str,
    pub status: StatusCode,
    pub body: String,
}

impl RelayOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    async fn from_response(action: &'static str, resp: Response) -> Self {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Self {
            action,
            status,
            body,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayClient {
    http: Client,
    server: String,
    threshold: u64,
}

impl RelayClient {
    pub fn new(server: impl Into<String>, threshold: u64) -> Self {
        Self::with_client(Client::new(), server, threshold)
    }

    pub fn with_client(http: Client, server: impl Into<String>, threshold: u64) -> Self {
        let server = server.into().trim_end_matches('/').to_string();
        Self {
            http,
            server,
            threshold,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.server, route)
    }

    /// Relay one operation and log the server's answer.
    ///
    /// Returns `None` when the request could not be made at all.
    pub async fn relay(&self, op: &ChangeOperation) -> Option<RelayOutcome> {
        match self.dispatch(op).await {
            Ok(outcome) => {
                if outcome.is_success() {
                    info!(
                        "[{}] {} -> {} {}",
                        outcome.action, op, outcome.status, outcome.body
                    );
                } else {
                    warn!(
                        "[{}] {} -> {} {}",
                        outcome.action, op, outcome.status, outcome.body
                    );
                }
                Some(outcome)
            }
            Err(e) => {
                error!("[{}] {} failed: {}", op.action(), op, e);
                None
            }
        }
    }

    /// Send the request matching `op`.
    pub async fn dispatch(&self, op: &ChangeOperation) -> Result<RelayOutcome, RelayError> {
        match op {
            ChangeOperation::Create {
                path,
                kind: EntryKind::Directory,
                ..
            }
            | ChangeOperation::Modify {
                path,
                kind: EntryKind::Directory,
                ..
            } => self.create_directory(path).await,
            ChangeOperation::Create { path, source, .. }
            | ChangeOperation::Modify { path, source, .. } => {
                self.upload_file(path, source).await
            }
            ChangeOperation::Delete {
                path,
                kind: EntryKind::Directory,
            } => self.delete_directory(path).await,
            ChangeOperation::Delete { path, .. } => self.delete_file(path).await,
            ChangeOperation::Move {
                from,
                to,
                kind: EntryKind::Directory,
            } => self.rename_directory(from, to).await,
            ChangeOperation::Move { from, to, .. } => self.rename_file(from, to).await,
        }
    }

    /// POST /uploadfile with the current contents of `source`.
    pub async fn upload_file(
        &self,
        path: &RelativePath,
        source: &Path,
    ) -> Result<RelayOutcome, RelayError> {
        let transfer_err = |e| RelayError::Transfer {
            path: source.to_path_buf(),
            source: e,
        };
        let payload = Payload::prepare(source, self.threshold)
            .await
            .map_err(transfer_err)?;
        let strategy = payload.strategy();
        let len = payload.len();
        let (part, _staged) = payload
            .into_part(path.file_name())
            .await
            .map_err(transfer_err)?;

        debug!("Uploading {} ({} bytes, {:?})", path, len, strategy);
        let form = Form::new()
            .text(SUB_PATH_FIELD, path.to_string())
            .part(FILE_FIELD, part);
        let resp = self
            .http
            .post(self.url(wire::UPLOAD_FILE))
            .multipart(form)
            .send()
            .await?;
        // `_staged` lives until here, so the scratch copy outlasts the request.
        Ok(RelayOutcome::from_response("upload", resp).await)
    }

    /// DELETE /deletefile?subPath=...
    pub async fn delete_file(&self, path: &RelativePath) -> Result<RelayOutcome, RelayError> {
        self.delete(wire::DELETE_FILE, "delete file", path).await
    }

    /// DELETE /deletedirectory?subPath=...
    pub async fn delete_directory(&self, path: &RelativePath) -> Result<RelayOutcome, RelayError> {
        self.delete(wire::DELETE_DIRECTORY, "delete directory", path)
            .await
    }

    async fn delete(
        &self,
        route: &str,
        action: &'static str,
        path: &RelativePath,
    ) -> Result<RelayOutcome, RelayError> {
        let query = SubPathForm {
            sub_path: path.to_string(),
        };
        let resp = self.http.delete(self.url(route)).query(&query).send().await?;
        Ok(RelayOutcome::from_response(action, resp).await)
    }

    /// PUT /renamefile
    pub async fn rename_file(
        &self,
        from: &RelativePath,
        to: &RelativePath,
    ) -> Result<RelayOutcome, RelayError> {
        self.rename(wire::RENAME_FILE, "rename file", from, to).await
    }

    /// PUT /renamedirectory
    pub async fn rename_directory(
        &self,
        from: &RelativePath,
        to: &RelativePath,
    ) -> Result<RelayOutcome, RelayError> {
        self.rename(wire::RENAME_DIRECTORY, "rename directory", from, to)
            .await
    }

    async fn rename(
        &self,
        route: &str,
        action: &'static str,
        from: &RelativePath,
        to: &RelativePath,
    ) -> Result<RelayOutcome, RelayError> {
        let form = RenameForm {
            old_sub_path: from.to_string(),
            new_sub_path: to.to_string(),
        };
        let resp = self.http.put(self.url(route)).form(&form).send().await?;
        Ok(RelayOutcome::from_response(action, resp).await)
    }

    /// POST /createdirectory
    pub async fn create_directory(&self, path: &RelativePath) -> Result<RelayOutcome, RelayError> {
        let form = SubPathForm {
            sub_path: path.to_string(),
        };
        let resp = self
            .http
            .post(self.url(wire::CREATE_DIRECTORY))
            .form(&form)
            .send()
            .await?;
        Ok(RelayOutcome::from_response("create directory", resp).await)
    }
}
