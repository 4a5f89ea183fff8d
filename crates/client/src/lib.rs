//! Durable Streams Rust Client
//!
//! A Rust client library for the Durable Streams protocol - persistent, resumable
//! event streams over HTTP with exactly-once semantics.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use durable_streams::{Client, Offset};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new();
//!     let stream = client.stream("https://api.example.com/streams/my-stream");
//!
//!     // Create a stream
//!     stream.create().await?;
//!
//!     // Append data
//!     stream.append(b"hello world").await?;
//!
//!     // Read data
//!     let mut reader = stream.read().offset(Offset::Beginning).build();
//!     while let Some(chunk) = reader.next_chunk().await? {
//!         println!("Got {} bytes", chunk.data.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod iterator;
mod producer;
mod retry;
mod sse;
mod stream;
mod types;

pub use client::{Client, ClientBuilder};
pub use error::{InvalidHeaderError, ProducerError, StreamError};
pub use iterator::{Chunk, ChunkIterator, ReadBuilder};
pub use producer::{AppendReceipt, Producer, ProducerBuilder};
pub use retry::{JitterMode, RetryConfig};
pub use stream::{AppendOptions, AppendResponse, CreateOptions, DeleteOptions, DurableStream, HeadOptions, HeadResponse};
pub use types::{LiveMode, Offset};

/// Done sentinel - indicates iteration is complete
pub const DONE: &str = "done";
