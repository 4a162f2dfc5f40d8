//! Board document models
//!
//! A board is persisted as a name plus a serialized column payload
//! (`board_data`). The payload is forwarded to the remote store as an
//! opaque string; locally it parses into [`BoardContent`] for mutation.
//! A payload that fails to parse is treated as an empty column sequence
//! so a corrupt cache entry degrades to an empty board instead of a
//! blocked editor.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

/// Newtype for board IDs - zero-cost type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(String);

impl BoardId {
    /// Create a new BoardId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get reference to inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract inner String, consuming self
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for BoardId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BoardId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BoardId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The persisted unit of a kanban board
///
/// `dirty` is local-only bookkeeping: true while mutations exist that the
/// remote store has not acknowledged. It never travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardDocument {
    pub id: BoardId,
    pub name: String,
    /// Serialized column payload, forwarded to the remote store as-is
    pub board_data: String,
    /// Unsaved local mutations exist
    #[serde(default)]
    pub dirty: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BoardDocument {
    /// Create a clean document with the given content
    pub fn new(id: impl Into<BoardId>, name: impl Into<String>, content: &BoardContent) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            board_data: content.to_json_lossy(),
            dirty: false,
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    /// Parse the column payload, substituting empty columns if malformed
    pub fn content(&self) -> BoardContent {
        BoardContent::parse_or_empty(&self.board_data)
    }
}

/// Parsed form of a board's column payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardContent {
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl BoardContent {
    /// Parse a serialized payload
    ///
    /// Malformed input yields an empty column sequence: losing formatting
    /// fidelity is preferable to losing the render.
    pub fn parse_or_empty(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str(raw) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "Malformed board content, substituting empty columns");
                Self::default()
            }
        }
    }

    /// Serialize the column payload
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(|e| CoreError::ContentSerialize {
            message: e.to_string(),
            source: e,
        })
    }

    /// Serialize, falling back to the empty payload on failure
    ///
    /// Serialization of this shape cannot fail in practice; the fallback
    /// keeps constructors infallible.
    pub fn to_json_lossy(&self) -> String {
        self.to_json()
            .unwrap_or_else(|_| r#"{"columns":[]}"#.to_string())
    }

    /// The column layout new boards are seeded with
    pub fn starter_template() -> Self {
        Self {
            columns: vec![
                Column::new("To do"),
                Column::new("In progress"),
                Column::new("Done"),
            ],
        }
    }

    /// Append a new column, returning its generated id
    pub fn add_column(&mut self, name: impl Into<String>) -> String {
        let column = Column::new(name);
        let id = column.id.clone();
        self.columns.push(column);
        id
    }

    /// Rename an existing column
    pub fn rename_column(&mut self, column_id: &str, name: impl Into<String>) -> Result<(), CoreError> {
        let column = self.column_mut(column_id)?;
        column.name = name.into();
        Ok(())
    }

    /// Remove a column and all its tasks
    pub fn remove_column(&mut self, column_id: &str) -> Result<Column, CoreError> {
        let index = self
            .columns
            .iter()
            .position(|c| c.id == column_id)
            .ok_or_else(|| CoreError::ColumnNotFound {
                column_id: column_id.to_string(),
            })?;
        Ok(self.columns.remove(index))
    }

    /// Move a column to a new position, shifting the rest
    pub fn move_column(&mut self, column_id: &str, index: usize) -> Result<(), CoreError> {
        let from = self
            .columns
            .iter()
            .position(|c| c.id == column_id)
            .ok_or_else(|| CoreError::ColumnNotFound {
                column_id: column_id.to_string(),
            })?;
        let column = self.columns.remove(from);
        let to = index.min(self.columns.len());
        self.columns.insert(to, column);
        Ok(())
    }

    /// Append a new task to a column, returning its generated id
    pub fn add_task(
        &mut self,
        column_id: &str,
        title: impl Into<String>,
    ) -> Result<String, CoreError> {
        let column = self.column_mut(column_id)?;
        let task = Task::new(title);
        let id = task.id.clone();
        column.tasks.push(task);
        Ok(id)
    }

    /// Remove a task from whichever column holds it
    pub fn remove_task(&mut self, task_id: &str) -> Result<Task, CoreError> {
        for column in &mut self.columns {
            if let Some(index) = column.tasks.iter().position(|t| t.id == task_id) {
                return Ok(column.tasks.remove(index));
            }
        }
        Err(CoreError::TaskNotFound {
            task_id: task_id.to_string(),
        })
    }

    /// Move a task to `index` within `dest_column_id`, removing it from
    /// its current column first
    ///
    /// Rebuilds both task sequences so the stored order always matches
    /// the final display order.
    pub fn move_task(
        &mut self,
        task_id: &str,
        dest_column_id: &str,
        index: usize,
    ) -> Result<(), CoreError> {
        if !self.columns.iter().any(|c| c.id == dest_column_id) {
            return Err(CoreError::ColumnNotFound {
                column_id: dest_column_id.to_string(),
            });
        }
        let mut task = self.remove_task(task_id)?;
        task.touch();
        // remove_task cannot invalidate the destination column
        let column = self.column_mut(dest_column_id)?;
        let to = index.min(column.tasks.len());
        column.tasks.insert(to, task);
        Ok(())
    }

    /// Mutable access to a task, wherever it lives
    pub fn task_mut(&mut self, task_id: &str) -> Result<&mut Task, CoreError> {
        self.columns
            .iter_mut()
            .flat_map(|c| c.tasks.iter_mut())
            .find(|t| t.id == task_id)
            .ok_or_else(|| CoreError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Look up a column by id
    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    fn column_mut(&mut self, column_id: &str) -> Result<&mut Column, CoreError> {
        self.columns
            .iter_mut()
            .find(|c| c.id == column_id)
            .ok_or_else(|| CoreError::ColumnNotFound {
                column_id: column_id.to_string(),
            })
    }
}

/// An ordered lane of tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Column {
    /// Create a column with a fresh client-generated id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_entity_id("column"),
            name: name.into(),
            tasks: Vec::new(),
        }
    }
}

/// A card on the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a task with a fresh client-generated id
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_entity_id("task"),
            title: title.into(),
            description: String::new(),
            completed: false,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Record a client-side modification timestamp
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

/// Generate a prefixed entity id
///
/// UUIDv7 keeps ids roughly creation-ordered while staying unique under
/// rapid same-millisecond creation.
fn new_entity_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::now_v7().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_or_empty_malformed() {
        let content = BoardContent::parse_or_empty("{not json");
        assert!(content.columns.is_empty());

        let content = BoardContent::parse_or_empty("");
        assert!(content.columns.is_empty());
    }

    #[test]
    fn test_content_round_trip() {
        let mut content = BoardContent::starter_template();
        let col_id = content.columns[0].id.clone();
        content.add_task(&col_id, "Fix bug").unwrap();
        content.add_task(&col_id, "Write docs").unwrap();

        let json = content.to_json().unwrap();
        let parsed = BoardContent::parse_or_empty(&json);
        assert_eq!(parsed, content);
    }

    #[test]
    fn test_content_accepts_original_payload_shape() {
        // Payload shape produced by the web client this store backs
        let raw = r#"{"columns":[{"id":"column_1700000000001","name":"Backlog","tasks":[
            {"id":"task_1700000000002","title":"Ship it","description":"",
             "createdAt":"2024-01-05T10:00:00Z","completed":false}]}]}"#;
        let content = BoardContent::parse_or_empty(raw);
        assert_eq!(content.columns.len(), 1);
        assert_eq!(content.columns[0].tasks[0].title, "Ship it");
        assert!(!content.columns[0].tasks[0].completed);
    }

    #[test]
    fn test_entity_ids_unique_under_rapid_creation() {
        let mut content = BoardContent::default();
        let col_id = content.add_column("Only");

        let mut ids = HashSet::new();
        for i in 0..100 {
            ids.insert(content.add_column(format!("col-{i}")));
            ids.insert(content.add_task(&col_id, format!("task-{i}")).unwrap());
        }
        assert_eq!(ids.len(), 200, "ids must not collide under rapid creation");
    }

    #[test]
    fn test_move_task_across_columns_preserves_order() {
        let mut content = BoardContent::default();
        let a = content.add_column("A");
        let b = content.add_column("B");

        let t1 = content.add_task(&a, "one").unwrap();
        let t2 = content.add_task(&a, "two").unwrap();
        let t3 = content.add_task(&b, "three").unwrap();

        // Move "one" to the middle of B
        content.move_task(&t1, &b, 1).unwrap();

        let order_b: Vec<_> = content.column(&b).unwrap().tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order_b, vec![t3.as_str(), t1.as_str()]);

        let order_a: Vec<_> = content.column(&a).unwrap().tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order_a, vec![t2.as_str()]);
    }

    #[test]
    fn test_move_task_within_column_clamps_index() {
        let mut content = BoardContent::default();
        let a = content.add_column("A");
        let t1 = content.add_task(&a, "one").unwrap();
        let t2 = content.add_task(&a, "two").unwrap();

        // Index past the end clamps to the tail
        content.move_task(&t1, &a, 99).unwrap();
        let order: Vec<_> = content.column(&a).unwrap().tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec![t2.as_str(), t1.as_str()]);

        // Empty and single-card columns are fine too
        let b = content.add_column("B");
        content.move_task(&t2, &b, 0).unwrap();
        assert_eq!(content.column(&b).unwrap().tasks.len(), 1);
    }

    #[test]
    fn test_move_column_reorders_and_clamps() {
        let mut content = BoardContent::default();
        let a = content.add_column("A");
        let b = content.add_column("B");
        let c = content.add_column("C");

        // Drag A between B and C
        content.move_column(&a, 1).unwrap();
        let order: Vec<_> = content.columns.iter().map(|col| col.id.as_str()).collect();
        assert_eq!(order, vec![b.as_str(), a.as_str(), c.as_str()]);

        // Index past the end clamps to the tail, same as task reorder
        content.move_column(&b, 99).unwrap();
        let order: Vec<_> = content.columns.iter().map(|col| col.id.as_str()).collect();
        assert_eq!(order, vec![a.as_str(), c.as_str(), b.as_str()]);

        let err = content.move_column("column_missing", 0).unwrap_err();
        assert!(matches!(err, CoreError::ColumnNotFound { .. }));
        assert_eq!(content.columns.len(), 3);
    }

    #[test]
    fn test_rename_column() {
        let mut content = BoardContent::default();
        let a = content.add_column("Backlog");

        content.rename_column(&a, "Icebox").unwrap();
        assert_eq!(content.column(&a).unwrap().name, "Icebox");

        assert!(matches!(
            content.rename_column("column_missing", "x"),
            Err(CoreError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_task_touch_records_modification_time() {
        let mut content = BoardContent::default();
        let a = content.add_column("A");
        let t1 = content.add_task(&a, "one").unwrap();

        let task = content.task_mut(&t1).unwrap();
        assert!(task.updated_at.is_none());

        task.description = "details".to_string();
        task.touch();
        assert!(task.updated_at.is_some());
    }

    #[test]
    fn test_move_task_unknown_destination() {
        let mut content = BoardContent::default();
        let a = content.add_column("A");
        let t1 = content.add_task(&a, "one").unwrap();

        let err = content.move_task(&t1, "column_missing", 0).unwrap_err();
        assert!(matches!(err, CoreError::ColumnNotFound { .. }));
        // Task must not have been dropped
        assert_eq!(content.column(&a).unwrap().tasks.len(), 1);
    }

    #[test]
    fn test_remove_column_and_task() {
        let mut content = BoardContent::default();
        let a = content.add_column("A");
        let t1 = content.add_task(&a, "one").unwrap();

        let removed = content.remove_task(&t1).unwrap();
        assert_eq!(removed.title, "one");
        assert!(matches!(
            content.remove_task(&t1),
            Err(CoreError::TaskNotFound { .. })
        ));

        content.remove_column(&a).unwrap();
        assert!(content.columns.is_empty());
    }

    #[test]
    fn test_document_content_fallback() {
        let mut doc = BoardDocument::new("b1", "Sprint", &BoardContent::starter_template());
        assert_eq!(doc.content().columns.len(), 3);

        doc.board_data = "garbage".to_string();
        assert!(doc.content().columns.is_empty());
    }
}
