//! slskd REST client for Soulbridge
//!
//! slskd exposes the Soulseek network over HTTP. This crate wraps the small
//! part of its API the download worker needs:
//!
//! - Searching the network and collecting peer responses
//! - Enqueueing a download from a peer
//! - Polling a transfer's progress
//! - Cancelling a transfer
//!
//! The client performs no retries of its own. Retrying and backing off is
//! the job engine's responsibility, and every call is expected to be routed
//! through its circuit breaker.
//!
//! # Example
//!
//! ```no_run
//! use soulbridge_slskd_client::SlskdClient;
//! use soulbridge_shared_config::SlskdConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SlskdClient::new(&SlskdConfig::new("http://localhost:5030", "api-key"))?;
//!
//! let responses = client.search("Boards of Canada Roygbiv").await?;
//! if let Some(peer) = responses.first() {
//!     let file = &peer.files[0];
//!     let id = client.enqueue_download(&peer.username, &file.filename, file.size).await?;
//!     let transfer = client.transfer(&peer.username, &id).await?;
//!     println!("{}: {:.1}%", transfer.filename, transfer.percent_complete);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod models;

pub use client::SlskdClient;
pub use error::{SlskdError, SlskdResult};
pub use models::{SearchFile, SearchResponse, SearchState, Transfer, TransferState};
