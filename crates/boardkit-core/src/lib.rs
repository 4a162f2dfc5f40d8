//! boardkit-core - Core library for boardkit
//!
//! Provides board models, the two-tier board cache, the remote store
//! client, and the edit session with debounced persistence.

pub mod cache;
pub mod error;
pub mod event;
pub mod models;
pub mod remote;
pub mod session;

pub use cache::{BoardCache, CacheStats};
pub use error::CoreError;
pub use event::{BoardEvent, EventBus};
pub use models::{BoardContent, BoardDocument, BoardId, Column, Task};
pub use remote::{BoardPatch, HttpBoardStore, RemoteBoardStore};
pub use session::{BoardEditSession, SaveStatus, SessionConfig};
