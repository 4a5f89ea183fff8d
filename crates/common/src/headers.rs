//! Canonical header and query-parameter names shared by client and server.

pub const CONTENT_TYPE: &str = "content-type";
pub const STREAM_NEXT_OFFSET: &str = "stream-next-offset";
pub const STREAM_UP_TO_DATE: &str = "stream-up-to-date";
pub const STREAM_CURSOR: &str = "stream-cursor";
pub const STREAM_TTL: &str = "stream-ttl";
pub const STREAM_EXPIRES_AT: &str = "stream-expires-at";
pub const STREAM_SEQ: &str = "stream-seq";
pub const ETAG: &str = "etag";
pub const IF_MATCH: &str = "if-match";

pub const PRODUCER_ID: &str = "producer-id";
pub const PRODUCER_EPOCH: &str = "producer-epoch";
pub const PRODUCER_SEQ: &str = "producer-seq";
pub const PRODUCER_EXPECTED_SEQ: &str = "producer-expected-seq";
pub const PRODUCER_RECEIVED_SEQ: &str = "producer-received-seq";

pub const X_CONTENT_TYPE_OPTIONS: &str = "x-content-type-options";
pub const CROSS_ORIGIN_RESOURCE_POLICY: &str = "cross-origin-resource-policy";
pub const CACHE_CONTROL: &str = "cache-control";

pub const QUERY_OFFSET: &str = "offset";
pub const QUERY_LIVE: &str = "live";
pub const QUERY_CURSOR: &str = "cursor";

pub const LIVE_LONG_POLL: &str = "long-poll";
pub const LIVE_SSE: &str = "sse";
