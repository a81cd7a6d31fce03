//! Airlock relay client.
//!
//! The isolated side of the relay: issues read-only filesystem
//! queries (list, stat, get, hash, readlink) to an Airlock server
//! across a constrained datagram link, and implements the
//! code-directory conventions the upload front-end stages files
//! under.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use airlock_client::{Client, Retriever};
//! use airlock_core::UdpLink;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let link = UdpLink::connect(airlock_core::DEFAULT_PEER).await?;
//! let mut client = Client::connect(link, Duration::from_secs(30)).await?;
//!
//! let mut retriever = Retriever::new(&mut client, "/xfer-data");
//! if let Some(delivery) = retriever.prepare("42").await? {
//!     let content = client.get_file(&delivery.path).await?;
//!     println!("{} bytes of {:?}", content.len(), delivery.filename);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod client;
mod error;
mod retrieve;

pub use client::{ChunkStream, Client, HashComparison, Listing};
pub use error::ClientError;
pub use retrieve::{CODE_WIDTH, Delivery, Retriever};
