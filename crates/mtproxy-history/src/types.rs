//! The conversation/request-trace data model, grounded in `log_handler.py`'s
//! `_Tracker`/`Conversation`/`DataType`/`ConversationType`.

use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    FromClient,
    FromServer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Header,
    Data,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub direction: Direction,
    pub kind: ConversationKind,
    pub length: usize,
    pub at: u64,
    /// Only populated for `ConversationKind::Header`, matching the source
    /// (which only retains the `data` field for header conversations).
    pub header_bytes: Option<Vec<u8>>,
}

impl Conversation {
    pub fn header(direction: Direction, data: &[u8]) -> Self {
        Self {
            direction,
            kind: ConversationKind::Header,
            length: data.len(),
            at: now_millis(),
            header_bytes: Some(data.to_vec()),
        }
    }

    pub fn data(direction: Direction, length: usize) -> Self {
        Self {
            direction,
            kind: ConversationKind::Data,
            length,
            at: now_millis(),
            header_bytes: None,
        }
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone)]
pub struct RequestTrace {
    pub id: u64,
    pub url: String,
    pub init_time: u64,
    pub conversations: Vec<Conversation>,
}

impl RequestTrace {
    pub fn new(id: u64, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            init_time: now_millis(),
            conversations: Vec::new(),
        }
    }

    pub fn total_size(&self) -> usize {
        self.conversations.iter().map(|c| c.length).sum()
    }
}
