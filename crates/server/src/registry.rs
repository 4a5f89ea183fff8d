//! Stream registry: path -> stream state, with lazy TTL/expiry sweep.

use crate::error::ServiceError;
use crate::log::{Record, RecordLog};
use crate::producer_table::{Decision, ProducerTable};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use durable_streams_common::offset::{Offset, RequestOffset};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Broadcast to every subscriber on every stream; readers filter by path.
/// Mirrors the single shared channel a comparable in-memory reference
/// server uses instead of a per-stream task, so idle streams cost
/// nothing beyond a hashmap entry.
#[derive(Debug, Clone)]
pub struct TailNotification {
    pub path: String,
    pub tail: Offset,
}

struct StreamEntry {
    content_type: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    log: RecordLog,
    producers: ProducerTable,
    /// Last `stream-seq` seen on a non-idempotent append, for strictly
    /// increasing client-side ordering. Unrelated to producer epoch/seq.
    last_client_seq: Option<u64>,
}

impl StreamEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        durable_streams_common::ttl::is_expired(self.expires_at, now)
    }
}

pub struct ReadResult {
    pub records: Vec<Record>,
    pub next_offset: Offset,
    pub up_to_date: bool,
}

pub struct HeadInfo {
    pub content_type: Option<String>,
    pub tail: Offset,
}

pub struct StreamRegistry {
    streams: RwLock<HashMap<String, StreamEntry>>,
    notify_tx: broadcast::Sender<TailNotification>,
}

impl StreamRegistry {
    pub fn new() -> Arc<Self> {
        let (notify_tx, _) = broadcast::channel(1024);
        Arc::new(Self {
            streams: RwLock::new(HashMap::new()),
            notify_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TailNotification> {
        self.notify_tx.subscribe()
    }

    /// Drop a stream if it has expired, returning true if it was removed.
    fn sweep_if_expired(&self, path: &str, now: DateTime<Utc>) -> bool {
        let mut streams = self.streams.write();
        if let Some(entry) = streams.get(path) {
            if entry.is_expired(now) {
                streams.remove(path);
                info!(path, "stream expired");
                return true;
            }
        }
        false
    }

    pub fn exists(&self, path: &str, now: DateTime<Utc>) -> bool {
        self.sweep_if_expired(path, now);
        self.streams.read().contains_key(path)
    }

    pub fn head(&self, path: &str, now: DateTime<Utc>) -> Option<HeadInfo> {
        self.sweep_if_expired(path, now);
        let streams = self.streams.read();
        streams.get(path).map(|e| HeadInfo {
            content_type: e.content_type.clone(),
            tail: e.log.tail(),
        })
    }

    /// Create or idempotently re-create a stream.
    ///
    /// Returns `Ok(true)` if newly created, `Ok(false)` if an
    /// identical stream already existed.
    pub fn create(
        &self,
        path: &str,
        content_type: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        initial_data: Option<Bytes>,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        self.sweep_if_expired(path, now);
        let mut streams = self.streams.write();

        if let Some(existing) = streams.get(path) {
            // Only content-type is part of the idempotency check: two
            // `stream-ttl`-bearing creates legitimately recompute a
            // different absolute `expires_at` on every call, and that
            // alone must not turn a repeat create into a conflict.
            if existing.content_type != content_type {
                return Err(ServiceError::ConfigMismatch);
            }
            return Ok(false);
        }

        let mut entry = StreamEntry {
            content_type,
            created_at: now,
            expires_at,
            log: RecordLog::new(),
            producers: ProducerTable::new(),
            last_client_seq: None,
        };

        if let Some(data) = initial_data {
            if !data.is_empty() {
                let ct = entry.content_type.clone();
                entry.log.append(data, ct, now.timestamp_millis() as u64);
            }
        }

        info!(path, "created stream");
        streams.insert(path.to_string(), entry);
        Ok(true)
    }

    pub fn delete(&self, path: &str) -> bool {
        let mut streams = self.streams.write();
        let removed = streams.remove(path).is_some();
        if removed {
            info!(path, "deleted stream");
        }
        removed
    }

    /// Append a non-idempotent record (no producer fencing), validating
    /// content-type match and optional strictly-increasing client `seq`.
    pub fn append(
        &self,
        path: &str,
        data: Bytes,
        content_type: Option<&str>,
        seq: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Offset, ServiceError> {
        if self.sweep_if_expired(path, now) {
            return Err(ServiceError::NotFound(path.to_string()));
        }
        let mut streams = self.streams.write();
        let entry = streams
            .get_mut(path)
            .ok_or_else(|| ServiceError::NotFound(path.to_string()))?;

        if let (Some(ct), Some(stream_ct)) = (content_type, entry.content_type.as_deref()) {
            if !content_type_matches(ct, stream_ct) {
                return Err(ServiceError::ContentTypeMismatch {
                    expected: stream_ct.to_string(),
                    actual: ct.to_string(),
                });
            }
        }

        if let Some(s) = seq {
            let parsed: u64 = s
                .parse()
                .map_err(|_| ServiceError::BadRequest(format!("stream-seq must be an integer: {s}")))?;
            if let Some(last) = entry.last_client_seq {
                if parsed <= last {
                    return Err(ServiceError::SequenceConflict(format!(
                        "{parsed} <= last sequence {last}"
                    )));
                }
            }
            entry.last_client_seq = Some(parsed);
        }

        if is_json_content_type(entry.content_type.as_deref()) {
            let trimmed = std::str::from_utf8(&data).unwrap_or("").trim();
            if trimmed == "[]" {
                return Err(ServiceError::EmptyArrayNotAllowed);
            }
        }

        let offset = entry
            .log
            .append(data, content_type.map(str::to_string), now.timestamp_millis() as u64);

        debug!(path, %offset, "appended to stream");
        let _ = self.notify_tx.send(TailNotification {
            path: path.to_string(),
            tail: offset,
        });

        Ok(offset)
    }

    /// Append an idempotent-producer record, applying the epoch/seq
    /// state machine before committing.
    pub fn append_idempotent(
        &self,
        path: &str,
        producer_id: &str,
        epoch: u64,
        seq: u64,
        data: Bytes,
        content_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Offset, bool), ServiceError> {
        if self.sweep_if_expired(path, now) {
            return Err(ServiceError::NotFound(path.to_string()));
        }
        let mut streams = self.streams.write();
        let entry = streams
            .get_mut(path)
            .ok_or_else(|| ServiceError::NotFound(path.to_string()))?;

        match entry.producers.evaluate(producer_id, epoch, seq) {
            Decision::StaleEpoch { server_epoch } => {
                return Err(ServiceError::StaleEpoch { server_epoch })
            }
            Decision::SequenceGap { expected } => {
                return Err(ServiceError::SequenceGap {
                    expected,
                    received: seq,
                })
            }
            Decision::Duplicate { offset } => {
                return Ok((offset.unwrap_or(entry.log.tail()), true));
            }
            Decision::Commit => {}
        }

        if let (Some(ct), Some(stream_ct)) = (content_type, entry.content_type.as_deref()) {
            if !content_type_matches(ct, stream_ct) {
                return Err(ServiceError::ContentTypeMismatch {
                    expected: stream_ct.to_string(),
                    actual: ct.to_string(),
                });
            }
        }

        let offset = entry
            .log
            .append(data, content_type.map(str::to_string), now.timestamp_millis() as u64);
        entry.producers.ack(producer_id, epoch, seq, offset);

        let _ = self.notify_tx.send(TailNotification {
            path: path.to_string(),
            tail: offset,
        });

        Ok((offset, false))
    }

    pub fn read(&self, path: &str, from: &RequestOffset, now: DateTime<Utc>) -> Result<ReadResult, ServiceError> {
        self.sweep_if_expired(path, now);
        let streams = self.streams.read();
        let entry = streams
            .get(path)
            .ok_or_else(|| ServiceError::NotFound(path.to_string()))?;

        let records = match from {
            RequestOffset::Beginning => entry.log.scan_all(),
            RequestOffset::Now => Vec::new(),
            RequestOffset::At(o) => entry.log.scan_after(*o),
        };

        let next_offset = records.last().map(|r| r.offset).unwrap_or(entry.log.tail());
        let up_to_date = next_offset >= entry.log.tail();

        Ok(ReadResult {
            records,
            next_offset,
            up_to_date,
        })
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.streams.read().get(path).and_then(|e| e.content_type.clone())
    }

    /// Format a batch of records for a catch-up/long-poll response body.
    /// JSON streams are joined into one top-level array; everything else
    /// is concatenated raw.
    pub fn format_records(&self, path: &str, records: &[Record]) -> Vec<u8> {
        let is_json = self
            .streams
            .read()
            .get(path)
            .is_some_and(|e| is_json_content_type(e.content_type.as_deref()));

        if is_json {
            let mut body = Vec::with_capacity(records.iter().map(|r| r.data.len()).sum::<usize>() + 2);
            body.push(b'[');
            for (i, r) in records.iter().enumerate() {
                if i > 0 {
                    body.push(b',');
                }
                body.extend_from_slice(&r.data);
            }
            body.push(b']');
            body
        } else {
            records.iter().flat_map(|r| r.data.iter().copied()).collect()
        }
    }
}

fn normalize_content_type(ct: &str) -> String {
    ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase()
}

fn content_type_matches(a: &str, b: &str) -> bool {
    normalize_content_type(a) == normalize_content_type(b)
}

fn is_json_content_type(ct: Option<&str>) -> bool {
    ct.map(|ct| {
        let ct = normalize_content_type(ct);
        ct == "application/json" || ct.ends_with("+json")
    })
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn create_is_idempotent_for_matching_config() {
        let reg = StreamRegistry::new();
        let created1 = reg
            .create("/s", Some("text/plain".into()), None, None, now())
            .unwrap();
        let created2 = reg
            .create("/s", Some("text/plain".into()), None, None, now())
            .unwrap();
        assert!(created1);
        assert!(!created2);
    }

    #[test]
    fn create_rejects_mismatched_content_type() {
        let reg = StreamRegistry::new();
        reg.create("/s", Some("text/plain".into()), None, None, now())
            .unwrap();
        let result = reg.create("/s", Some("application/json".into()), None, None, now());
        assert!(matches!(result, Err(ServiceError::ConfigMismatch)));
    }

    #[test]
    fn append_and_read_round_trips() {
        let reg = StreamRegistry::new();
        reg.create("/s", Some("text/plain".into()), None, None, now())
            .unwrap();
        reg.append("/s", Bytes::from_static(b"hello"), Some("text/plain"), None, now())
            .unwrap();
        let result = reg.read("/s", &RequestOffset::Beginning, now()).unwrap();
        assert_eq!(result.records.len(), 1);
        assert!(result.up_to_date);
    }

    #[test]
    fn json_streams_are_wrapped_in_an_array() {
        let reg = StreamRegistry::new();
        reg.create("/s", Some("application/json".into()), None, None, now())
            .unwrap();
        reg.append("/s", Bytes::from_static(b"{\"a\":1}"), Some("application/json"), None, now())
            .unwrap();
        reg.append("/s", Bytes::from_static(b"{\"b\":2}"), Some("application/json"), None, now())
            .unwrap();
        let result = reg.read("/s", &RequestOffset::Beginning, now()).unwrap();
        let body = reg.format_records("/s", &result.records);
        assert_eq!(body, b"[{\"a\":1},{\"b\":2}]".to_vec());
    }

    #[test]
    fn idempotent_append_rejects_gap_and_dedups_retransmit() {
        let reg = StreamRegistry::new();
        reg.create("/s", Some("text/plain".into()), None, None, now())
            .unwrap();
        let (o1, dup1) = reg
            .append_idempotent("/s", "p1", 0, 0, Bytes::from_static(b"a"), Some("text/plain"), now())
            .unwrap();
        assert!(!dup1);

        let (o2, dup2) = reg
            .append_idempotent("/s", "p1", 0, 0, Bytes::from_static(b"a"), Some("text/plain"), now())
            .unwrap();
        assert!(dup2);
        assert_eq!(o1, o2);

        let gap = reg.append_idempotent("/s", "p1", 0, 5, Bytes::from_static(b"b"), Some("text/plain"), now());
        assert!(matches!(gap, Err(ServiceError::SequenceGap { expected: 1, .. })));
    }

    #[test]
    fn stream_seq_ordering_is_numeric_not_lexicographic() {
        let reg = StreamRegistry::new();
        reg.create("/s", Some("text/plain".into()), None, None, now())
            .unwrap();
        reg.append("/s", Bytes::from_static(b"a"), Some("text/plain"), Some("9"), now())
            .unwrap();
        let result = reg.append("/s", Bytes::from_static(b"b"), Some("text/plain"), Some("10"), now());
        assert!(result.is_ok());

        let replay = reg.append("/s", Bytes::from_static(b"c"), Some("text/plain"), Some("10"), now());
        assert!(matches!(replay, Err(ServiceError::SequenceConflict(_))));
    }

    #[test]
    fn non_numeric_stream_seq_is_a_bad_request() {
        let reg = StreamRegistry::new();
        reg.create("/s", Some("text/plain".into()), None, None, now())
            .unwrap();
        let result = reg.append("/s", Bytes::from_static(b"a"), Some("text/plain"), Some("not-a-number"), now());
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
    }

    #[test]
    fn create_is_idempotent_across_recomputed_ttl_expiry() {
        let reg = StreamRegistry::new();
        let t1 = now();
        let t2 = t1 + chrono::Duration::seconds(1);
        let created1 = reg
            .create(
                "/s",
                Some("text/plain".into()),
                Some(t1 + chrono::Duration::seconds(60)),
                None,
                t1,
            )
            .unwrap();
        let created2 = reg
            .create(
                "/s",
                Some("text/plain".into()),
                Some(t2 + chrono::Duration::seconds(60)),
                None,
                t2,
            )
            .unwrap();
        assert!(created1);
        assert!(!created2);
    }
}
