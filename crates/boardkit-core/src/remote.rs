//! Remote board store client
//!
//! REST surface:
//! - `GET    /api/boards`      - list boards
//! - `POST   /api/boards`      - create board
//! - `GET    /api/boards/{id}` - fetch board
//! - `PUT    /api/boards/{id}` - update board (name + column payload)
//! - `DELETE /api/boards/{id}` - delete board
//!
//! All calls are async except `update_board_blocking`, which exists for
//! session teardown: once the caller is tearing down, an async completion
//! is not guaranteed to run, so the final flush must be issued on the
//! calling thread before control returns.

use crate::error::CoreError;
use crate::models::{BoardDocument, BoardId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

/// Update/create payload: the document fields the store accepts
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardPatch {
    pub name: String,
    pub board_data: String,
}

impl BoardPatch {
    /// Snapshot the persistable fields of a document
    pub fn from_document(board: &BoardDocument) -> Self {
        Self {
            name: board.name.clone(),
            board_data: board.board_data.clone(),
        }
    }
}

/// Abstraction over the HTTP API, mockable in tests
#[async_trait]
pub trait RemoteBoardStore: Send + Sync {
    async fn fetch_board(&self, id: &BoardId) -> Result<BoardDocument, CoreError>;

    async fn fetch_boards(&self) -> Result<Vec<BoardDocument>, CoreError>;

    async fn create_board(&self, patch: &BoardPatch) -> Result<BoardDocument, CoreError>;

    async fn update_board(
        &self,
        id: &BoardId,
        patch: &BoardPatch,
    ) -> Result<BoardDocument, CoreError>;

    async fn delete_board(&self, id: &BoardId) -> Result<(), CoreError>;

    /// Blocking update for teardown; must have issued the request before
    /// returning
    fn update_board_blocking(
        &self,
        id: &BoardId,
        patch: &BoardPatch,
    ) -> Result<BoardDocument, CoreError>;
}

/// Board DTO as the backend serves it
///
/// Ids arrive as JSON numbers, timestamps as `yyyy-MM-dd HH:mm:ss`; both
/// are normalized here so the rest of the crate sees string ids and UTC
/// timestamps.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteBoard {
    #[serde(deserialize_with = "de_id")]
    id: String,
    name: String,
    #[serde(default)]
    board_data: String,
    #[serde(default, deserialize_with = "de_datetime")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_datetime")]
    updated_at: Option<DateTime<Utc>>,
}

impl RemoteBoard {
    fn into_document(self) -> BoardDocument {
        BoardDocument {
            id: BoardId::new(self.id),
            name: self.name,
            board_data: self.board_data,
            dirty: false,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Accept numeric or string ids
fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Num(i64),
        Str(String),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Num(n) => n.to_string(),
        Id::Str(s) => s,
    })
}

/// Accept RFC 3339 or the backend's space-separated timestamp format
fn de_datetime<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else { return Ok(None) };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(Some(naive.and_utc()));
    }
    Err(serde::de::Error::custom(format!(
        "unrecognized timestamp: {raw}"
    )))
}

/// HTTP implementation of [`RemoteBoardStore`]
pub struct HttpBoardStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBoardStore {
    /// Create a store client for the given origin (no trailing slash)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create with a preconfigured client (custom timeouts, headers)
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, client }
    }

    fn boards_url(&self) -> String {
        format!("{}/api/boards", self.base_url)
    }

    fn board_url(&self, id: &BoardId) -> String {
        format!("{}/api/boards/{}", self.base_url, id)
    }

    fn check_status(
        operation: &'static str,
        board_id: &BoardId,
        status: reqwest::StatusCode,
    ) -> Result<(), CoreError> {
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CoreError::BoardNotFound {
                board_id: board_id.as_str().to_string(),
            });
        }
        if !status.is_success() {
            return Err(CoreError::RemoteStatus {
                operation,
                board_id: board_id.as_str().to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteBoardStore for HttpBoardStore {
    async fn fetch_board(&self, id: &BoardId) -> Result<BoardDocument, CoreError> {
        debug!(board_id = %id, "Fetching board");

        let response = self
            .client
            .get(self.board_url(id))
            .send()
            .await
            .map_err(|e| CoreError::remote_transport("board fetch failed", e))?;

        Self::check_status("fetch", id, response.status())?;

        let remote: RemoteBoard = response
            .json()
            .await
            .map_err(|e| CoreError::remote_transport("board response unreadable", e))?;

        Ok(remote.into_document())
    }

    async fn fetch_boards(&self) -> Result<Vec<BoardDocument>, CoreError> {
        let response = self
            .client
            .get(self.boards_url())
            .send()
            .await
            .map_err(|e| CoreError::remote_transport("board list fetch failed", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::remote(format!(
                "board list rejected: HTTP {status}"
            )));
        }

        let remote: Vec<RemoteBoard> = response
            .json()
            .await
            .map_err(|e| CoreError::remote_transport("board list unreadable", e))?;

        Ok(remote.into_iter().map(RemoteBoard::into_document).collect())
    }

    async fn create_board(&self, patch: &BoardPatch) -> Result<BoardDocument, CoreError> {
        let response = self
            .client
            .post(self.boards_url())
            .json(patch)
            .send()
            .await
            .map_err(|e| CoreError::remote_transport("board create failed", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::remote(format!(
                "board create rejected: HTTP {status}"
            )));
        }

        let remote: RemoteBoard = response
            .json()
            .await
            .map_err(|e| CoreError::remote_transport("board create response unreadable", e))?;

        Ok(remote.into_document())
    }

    async fn update_board(
        &self,
        id: &BoardId,
        patch: &BoardPatch,
    ) -> Result<BoardDocument, CoreError> {
        debug!(board_id = %id, "Updating board");

        let response = self
            .client
            .put(self.board_url(id))
            .json(patch)
            .send()
            .await
            .map_err(|e| CoreError::remote_transport("board update failed", e))?;

        Self::check_status("update", id, response.status())?;

        let remote: RemoteBoard = response
            .json()
            .await
            .map_err(|e| CoreError::remote_transport("board update response unreadable", e))?;

        Ok(remote.into_document())
    }

    async fn delete_board(&self, id: &BoardId) -> Result<(), CoreError> {
        let response = self
            .client
            .delete(self.board_url(id))
            .send()
            .await
            .map_err(|e| CoreError::remote_transport("board delete failed", e))?;

        Self::check_status("delete", id, response.status())
    }

    fn update_board_blocking(
        &self,
        id: &BoardId,
        patch: &BoardPatch,
    ) -> Result<BoardDocument, CoreError> {
        let url = self.board_url(id);
        let body = serde_json::to_string(patch).map_err(|e| CoreError::ContentSerialize {
            message: e.to_string(),
            source: e,
        })?;

        debug!(board_id = %id, "Issuing blocking board update");

        // The blocking client cannot be driven from an async runtime
        // thread. A scoped thread keeps the call legal there while the
        // caller still blocks until the request has completed.
        std::thread::scope(|scope| {
            scope
                .spawn(move || -> Result<BoardDocument, CoreError> {
                    let client = reqwest::blocking::Client::new();
                    let response = client
                        .put(&url)
                        .header(reqwest::header::CONTENT_TYPE, "application/json")
                        .body(body)
                        .send()
                        .map_err(|e| CoreError::remote_transport("blocking board update failed", e))?;

                    Self::check_status("update", id, response.status())?;

                    let remote: RemoteBoard = response.json().map_err(|e| {
                        CoreError::remote_transport("board update response unreadable", e)
                    })?;
                    Ok(remote.into_document())
                })
                .join()
                .unwrap_or_else(|_| Err(CoreError::remote("blocking update thread panicked")))
        })
    }
}
