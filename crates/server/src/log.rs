//! Per-stream append-only record log.

use durable_streams_common::offset::Offset;

#[derive(Debug, Clone)]
pub struct Record {
    pub offset: Offset,
    pub data: bytes::Bytes,
    pub content_type: Option<String>,
}

/// An ordered, append-only sequence of records for one stream.
///
/// Single-writer per stream: callers serialize appends themselves (the
/// registry holds one lock per stream covering both the log and the
/// producer table), so offset assignment here is infallible and never
/// needs its own lock.
#[derive(Debug, Default)]
pub struct RecordLog {
    records: Vec<Record>,
    tail: Offset,
}

impl RecordLog {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            tail: Offset::ZERO,
        }
    }

    pub fn tail(&self) -> Offset {
        self.tail
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append one record, assigning it the next offset after `now_ms`.
    pub fn append(&mut self, data: bytes::Bytes, content_type: Option<String>, now_ms: u64) -> Offset {
        let offset = self.tail.next(now_ms);
        self.tail = offset;
        self.records.push(Record {
            offset,
            data,
            content_type,
        });
        offset
    }

    /// Records with offset strictly greater than `from`, in order.
    pub fn scan_after(&self, from: Offset) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| r.offset > from)
            .cloned()
            .collect()
    }

    /// All records, used for the `-1` (beginning) sentinel.
    pub fn scan_all(&self) -> Vec<Record> {
        self.records.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_monotonic_offsets() {
        let mut log = RecordLog::new();
        let o1 = log.append(bytes::Bytes::from_static(b"a"), None, 100);
        let o2 = log.append(bytes::Bytes::from_static(b"b"), None, 100);
        let o3 = log.append(bytes::Bytes::from_static(b"c"), None, 101);
        assert!(o1 < o2);
        assert!(o2 < o3);
    }

    #[test]
    fn scan_after_excludes_up_to_and_including_cursor() {
        let mut log = RecordLog::new();
        let o1 = log.append(bytes::Bytes::from_static(b"a"), None, 1);
        log.append(bytes::Bytes::from_static(b"b"), None, 1);
        let after = log.scan_after(o1);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].data, bytes::Bytes::from_static(b"b"));
    }

    #[test]
    fn scan_all_returns_full_history_for_beginning_sentinel() {
        let mut log = RecordLog::new();
        log.append(bytes::Bytes::from_static(b"a"), None, 1);
        log.append(bytes::Bytes::from_static(b"b"), None, 1);
        assert_eq!(log.scan_all().len(), 2);
    }
}
