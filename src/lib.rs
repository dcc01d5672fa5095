//! Passive, single-host network traffic recorder.
//!
//! Captures link-layer frames on one or more interfaces, reconstructs
//! per-flow session events (TCP, UDP, DNS, TLS SNI, ICMP), persists them to
//! an embedded relational store, and compacts that store offline by
//! merging paired events and rolling old rows into hourly summaries.
//!
//! # Example
//!
//! ```no_run
//! use netwatch::config::CaptureConfig;
//! use netwatch::pipeline::Pipeline;
//! use netwatch::publisher::EventPublisher;
//! use netwatch::store::EventStore;
//! use std::sync::Arc;
//!
//! # async fn run() -> netwatch::error::Result<()> {
//! let store = Arc::new(EventStore::open("events.db")?);
//! let publisher = Arc::new(EventPublisher::new());
//! let config = CaptureConfig {
//!     interfaces: vec!["eth0".to_string()],
//!     ..Default::default()
//! };
//! let pipeline = Pipeline::start(config, store, publisher).await?;
//! // ... run until cancelled ...
//! pipeline.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod classify;
pub mod compactor;
pub mod config;
pub mod decode;
pub mod dns;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod publisher;
pub mod session;
pub mod store;
pub mod telemetry;
mod time;
pub mod tls;
pub mod writer;

pub use error::{NetwatchError, Result};
pub use event::{DnsRole, EndReason, EventType, NetworkEvent};
