//! Writes a registry snapshot to `log/<timestamp>_sort_by_{time,size}.log`,
//! grounded in `log_handler.py`'s `RequestTracker.dump`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use mtproxy_config::{HISTORY_DIR, HISTORY_DIVIDER_H1, HISTORY_DIVIDER_H2};
use tracing::debug;

use crate::types::{ConversationKind, Direction, RequestTrace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Time,
    Size,
}

impl SortBy {
    fn label(self) -> &'static str {
        match self {
            SortBy::Time => "time",
            SortBy::Size => "size",
        }
    }
}

pub fn log_file_path(log_dir: &Path, timestamp: u64, sort_by: SortBy) -> PathBuf {
    log_dir.join(format!("{timestamp}_sort_by_{}.log", sort_by.label()))
}

pub fn default_log_dir(state_dir: &Path) -> PathBuf {
    state_dir.join(HISTORY_DIR)
}

/// Renders `traces` sorted by `sort_by` into the dump format and writes it
/// to `log_dir/<timestamp>_sort_by_<sort_by>.log`.
pub fn dump(log_dir: &Path, timestamp: u64, sort_by: SortBy, traces: &[RequestTrace]) -> std::io::Result<PathBuf> {
    let mut sorted: Vec<&RequestTrace> = traces.iter().collect();
    match sort_by {
        SortBy::Time => sorted.sort_by_key(|t| t.init_time),
        SortBy::Size => sorted.sort_by_key(|t| t.total_size()),
    }

    let text = render(&sorted);

    std::fs::create_dir_all(log_dir)?;
    let path = log_file_path(log_dir, timestamp, sort_by);
    std::fs::write(&path, text)?;
    debug!(path = %path.display(), traces = traces.len(), "wrote request history dump");
    Ok(path)
}

fn render(traces: &[&RequestTrace]) -> String {
    let mut out = String::new();
    for trace in traces {
        let size_mb = trace.total_size() as f64 / 1024.0 / 1024.0;
        let _ = writeln!(
            out,
            "Request {} - {} - {} - {:.2} MB",
            trace.id, trace.url, trace.init_time, size_mb
        );

        for conversation in &trace.conversations {
            let direction = match conversation.direction {
                Direction::FromClient => "FROM_CLIENT",
                Direction::FromServer => "FROM_SERVER",
            };
            let kind = match conversation.kind {
                ConversationKind::Header => "HEADER",
                ConversationKind::Data => "DATA",
            };
            let _ = writeln!(
                out,
                "{direction} - {kind} - {} - {}",
                conversation.length, conversation.at
            );
            out.push_str(HISTORY_DIVIDER_H2);
            out.push('\n');
            if let Some(bytes) = &conversation.header_bytes {
                out.push_str(&String::from_utf8_lossy(bytes));
            }
        }
        out.push_str(HISTORY_DIVIDER_H1);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::Conversation;

    #[test]
    fn dump_writes_a_log_file_with_both_dividers() {
        let dir = tempfile::tempdir().unwrap();
        let mut trace = RequestTrace::new(0, "http://example.com/x");
        trace
            .conversations
            .push(Conversation::header(Direction::FromClient, b"GET / HTTP/1.1\r\n\r\n"));

        let path = dump(dir.path(), 1_700_000_000, SortBy::Time, std::slice::from_ref(&trace)).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains(HISTORY_DIVIDER_H1));
        assert!(text.contains(HISTORY_DIVIDER_H2));
        assert!(text.contains("GET / HTTP/1.1"));
    }

    #[test]
    fn sort_by_size_orders_smallest_first() {
        let mut small = RequestTrace::new(0, "http://example.com/small");
        small.conversations.push(Conversation::data(Direction::FromServer, 10));
        let mut big = RequestTrace::new(1, "http://example.com/big");
        big.conversations.push(Conversation::data(Direction::FromServer, 1000));

        let traces = vec![big.clone(), small.clone()];
        let mut sorted: Vec<&RequestTrace> = traces.iter().collect();
        sorted.sort_by_key(|t| t.total_size());
        assert_eq!(sorted[0].id, small.id);
    }
}
