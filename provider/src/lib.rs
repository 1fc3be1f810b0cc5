//! # Todo Sync Provider
//!
//! HTTP side of the external todo pipeline: a resilient transport and the
//! JSONPlaceholder-style client that speaks to the third-party `/todos` API.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use todo_sync_core::environment::UuidIdGenerator;
//! use todo_sync_core::{CancellationToken, ExternalTodoService};
//! use todo_sync_provider::{JsonPlaceholderClient, ResilientTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = ResilientTransport::builder("https://jsonplaceholder.typicode.com/")
//!         .attempt_timeout(Duration::from_secs(10))
//!         .build()?;
//!     let client = JsonPlaceholderClient::new(transport, Arc::new(UuidIdGenerator));
//!
//!     let todos = client.list(&CancellationToken::new()).await?;
//!     println!("{} todos", todos.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Behavior
//!
//! - Network failures, timeouts, 5xx and 408 are retried with exponential backoff
//! - Each attempt has its own timeout
//! - `get_by_id` maps 404 and empty bodies to `Ok(None)`
//! - Writes report provider acceptance as a `bool`

pub mod client;
pub mod error;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::JsonPlaceholderClient;
pub use error::BuildError;
pub use transport::{ResilientTransport, ResilientTransportBuilder, TransportRequest, TransportResponse};
pub use types::ExternalProviderItem;
