//! Data models for board documents

mod board;

pub use board::{BoardContent, BoardDocument, BoardId, Column, Task};
