//! Single-threaded dispatch loop gateway
//!
//! Requests are handed to a dedicated worker thread over a channel and served
//! strictly in submission order. Each reply travels back on its own oneshot
//! channel so callers can await it from any runtime.

use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::gateway::{Completion, ResponseHandle, TransportGateway};
use crate::request::Request;

/// Default time to wait for a reply
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Answers requests on the dispatch thread
pub trait Responder: Send + 'static {
    fn respond(&mut self, request: &Request) -> Completion;
}

/// Gateway settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// How long a caller waits for a reply
    pub timeout: Duration,
    /// Delay added before each reply is produced
    pub latency: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            latency: Duration::ZERO,
        }
    }
}

impl GatewayConfig {
    /// Create config from environment variables
    ///
    /// Reads:
    /// - `BACNET_TIMEOUT_MS`: reply timeout (default: 10000)
    /// - `BACNET_LATENCY_MS`: simulated reply delay (default: 0)
    pub fn from_env() -> Self {
        let timeout = std::env::var("BACNET_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);

        let latency = std::env::var("BACNET_LATENCY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO);

        Self { timeout, latency }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

enum DispatchCommand {
    Submit {
        request: Request,
        reply: oneshot::Sender<Completion>,
    },
    Shutdown,
}

/// Gateway backed by one worker thread serving a [`Responder`]
pub struct DispatchLoop {
    config: GatewayConfig,
    cmd_tx: mpsc::Sender<DispatchCommand>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl DispatchLoop {
    /// Start the worker thread
    pub fn spawn<R: Responder>(mut responder: R, config: GatewayConfig) -> io::Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<DispatchCommand>();
        let latency = config.latency;

        let handle = thread::Builder::new()
            .name("bacnet-dispatch".to_string())
            .spawn(move || {
                tracing::info!("Dispatch loop started");
                for command in cmd_rx {
                    match command {
                        DispatchCommand::Submit { request, reply } => {
                            if !latency.is_zero() {
                                thread::sleep(latency);
                            }
                            let completion = responder.respond(&request);
                            tracing::debug!(
                                "{} to {} -> {}",
                                request.service(),
                                request.destination(),
                                match &completion {
                                    Completion::Success(_) => "success",
                                    Completion::Failure(_) => "failure",
                                }
                            );
                            if reply.send(completion).is_err() {
                                tracing::debug!("Caller stopped waiting for {}", request.service());
                            }
                        }
                        DispatchCommand::Shutdown => {
                            tracing::info!("Dispatch loop shutting down");
                            break;
                        }
                    }
                }
                tracing::info!("Dispatch loop stopped");
            })?;

        Ok(Self {
            config,
            cmd_tx,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Stop the worker after the requests already queued
    pub fn shutdown(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        let _ = self.cmd_tx.send(DispatchCommand::Shutdown);
        if handle.join().is_err() {
            tracing::warn!("Dispatch worker panicked");
        }
    }
}

impl TransportGateway for DispatchLoop {
    fn submit(&self, request: Request) -> ResponseHandle {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(DispatchCommand::Submit { request, reply })
            .is_err()
        {
            // sender dropped with the command, the handle reports Closed
            tracing::warn!("Dispatch loop is not running");
        }
        ResponseHandle::new(rx, self.config.timeout)
    }
}

impl Drop for DispatchLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
