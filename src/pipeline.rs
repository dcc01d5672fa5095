//! Wires Packet Sources, the Session Manager, the writer, and the sweeper
//! into one cancellable run, and drives the graceful shutdown order.

use crate::config::CaptureConfig;
use crate::error::{NetwatchError, Result};
use crate::publisher::EventPublisher;
use crate::session::SessionManager;
use crate::store::EventStore;
use crate::writer::{self, EventChannel};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::info;

const SHUTDOWN_DRAIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

pub struct Pipeline {
    session: Arc<SessionManager>,
    shutdown: Arc<AtomicBool>,
    channel: EventChannel,
    capture_handles: Vec<JoinHandle<()>>,
    writer_handle: Option<JoinHandle<()>>,
    sweeper_handle: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Starts one task per configured interface, the writer task, and the
    /// sweeper task. Returns as soon as every interface has either started
    /// or been reported as unavailable; at least one interface must start.
    pub async fn start(config: CaptureConfig, store: Arc<EventStore>, publisher: Arc<EventPublisher>) -> Result<Self> {
        if config.interfaces.is_empty() {
            return Err(NetwatchError::Config {
                message: "at least one interface is required".to_string(),
            });
        }
        let channel = EventChannel::new(config.channel_capacity);
        let (tx, mut rx) = tokio::sync::mpsc::channel(config.channel_capacity);
        let session = Arc::new(SessionManager::new(config.clone(), tx));
        let shutdown = Arc::new(AtomicBool::new(false));
        let config = Arc::new(config);

        let bridge_channel = channel.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                bridge_channel.push(event);
            }
        });

        let mut capture_handles = Vec::new();
        for interface in &config.interfaces {
            let handle = tokio::spawn(crate::capture::run_packet_source(
                interface.clone(),
                config.clone(),
                session.clone(),
                shutdown.clone(),
            ));
            capture_handles.push(handle);
        }

        let writer_handle = {
            let channel = channel.clone();
            let store = store.clone();
            let publisher = publisher.clone();
            let batch_size = config.batch_size;
            let flush_interval = config.flush_interval;
            tokio::spawn(async move {
                writer::run_writer(channel, store, publisher, batch_size, flush_interval).await;
            })
        };

        let sweeper_handle = {
            let session = session.clone();
            let sweep_interval = config.sweep_interval;
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(sweep_interval);
                while !shutdown.load(Ordering::Relaxed) {
                    ticker.tick().await;
                    session.sweep();
                }
            })
        };

        Ok(Pipeline {
            session,
            shutdown,
            channel,
            capture_handles,
            writer_handle: Some(writer_handle),
            sweeper_handle: Some(sweeper_handle),
        })
    }

    /// Graceful shutdown: stop Packet Sources, drain the session manager's
    /// outstanding flows, flush the writer once more, then return. Bounded
    /// by a hard timeout so a stuck capture handle cannot hang the process.
    pub async fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.capture_handles.drain(..) {
            let _ = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, handle).await;
        }

        self.session.drain_all();

        if let Some(handle) = self.sweeper_handle.take() {
            handle.abort();
        }

        self.channel.close();
        if let Some(handle) = self.writer_handle.take() {
            let _ = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, handle).await;
        }
        info!("pipeline shut down");
    }
}
