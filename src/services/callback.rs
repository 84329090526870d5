// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Loopback listener that captures one OAuth redirect per attempt.
//!
//! The outcome is a single-shot value published through a `watch` channel:
//! every waiter sees the same result, and the first resolution wins
//! (callback, timeout, or close).

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::routes::{callback_router, CallbackState};

/// Upper bound on how long an interactive authorization may take.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Time in-flight responses get to finish after `close()`.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

const BIND_RETRY: Duration = Duration::from_millis(25);

/// How a pending authorization wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Redirect carried both parameters.
    Received { code: String, state: String },
    /// Redirect arrived without code/state (or with a provider error).
    MissingParameters(String),
    /// No redirect before the timeout.
    TimedOut,
    /// Listener was closed while waiting.
    Closed,
}

/// Resolve the outcome unless it is already set. Returns whether this call won.
pub fn resolve_outcome(
    sender: &watch::Sender<Option<CallbackOutcome>>,
    outcome: CallbackOutcome,
) -> bool {
    sender.send_if_modified(|current| {
        if current.is_none() {
            *current = Some(outcome);
            true
        } else {
            false
        }
    })
}

struct ActiveListener {
    local_addr: SocketAddr,
    sender: Arc<watch::Sender<Option<CallbackOutcome>>>,
    outcome: watch::Receiver<Option<CallbackOutcome>>,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
    timer: JoinHandle<()>,
}

/// Redirect listener bound to a fixed loopback address.
pub struct CallbackListener {
    addr: SocketAddr,
    timeout: Duration,
    active: Mutex<Option<ActiveListener>>,
}

impl CallbackListener {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: CALLBACK_TIMEOUT,
            active: Mutex::new(None),
        }
    }

    /// Listener on `127.0.0.1:<port>`.
    pub fn on_port(port: u16) -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    /// Override the wait timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Bind and start serving. Calling it while already listening returns
    /// the existing address without binding again.
    pub fn start(&self) -> Result<SocketAddr> {
        self.try_start()
            .map_err(|e| Error::CallbackListener(format!("bind {} failed: {e}", self.addr)))
    }

    fn try_start(&self) -> std::io::Result<SocketAddr> {
        let mut active = self.lock();
        if let Some(existing) = active.as_ref() {
            return Ok(existing.local_addr);
        }

        let std_listener = std::net::TcpListener::bind(self.addr)?;
        std_listener.set_nonblocking(true)?;
        let listener = tokio::net::TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        let (sender, outcome) = watch::channel(None);
        let sender = Arc::new(sender);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = callback_router(CallbackState::new(sender.clone()));
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Callback listener stopped with error");
            }
        });

        let timer_sender = sender.clone();
        let timeout = self.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if resolve_outcome(&timer_sender, CallbackOutcome::TimedOut) {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "No authorization redirect received before timeout"
                );
            }
        });

        *active = Some(ActiveListener {
            local_addr,
            sender,
            outcome,
            shutdown: Some(shutdown_tx),
            server,
            timer,
        });

        tracing::info!(address = %local_addr, "OAuth callback listener started");
        Ok(local_addr)
    }

    /// Start the listener and return a guard that closes it when dropped.
    ///
    /// A listener from a previous attempt may still be draining; the port
    /// is retried until the shutdown grace period has passed.
    pub async fn acquire(&self) -> Result<ListenerGuard<'_>> {
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE * 2;
        loop {
            match self.try_start() {
                Ok(_) => return Ok(ListenerGuard { listener: self }),
                Err(e)
                    if e.kind() == std::io::ErrorKind::AddrInUse
                        && tokio::time::Instant::now() < deadline =>
                {
                    tokio::time::sleep(BIND_RETRY).await;
                }
                Err(e) => {
                    return Err(Error::CallbackListener(format!(
                        "bind {} failed: {e}",
                        self.addr
                    )))
                }
            }
        }
    }

    /// Wait for the current attempt's outcome.
    ///
    /// Concurrent waiters all receive the same value.
    pub async fn wait_for_callback(&self) -> Result<CallbackOutcome> {
        let mut outcome = self
            .lock()
            .as_ref()
            .map(|active| active.outcome.clone())
            .ok_or_else(|| Error::CallbackListener("listener is not running".to_string()))?;

        let resolved = match outcome.wait_for(Option::is_some).await {
            Ok(value) => value.clone().unwrap_or(CallbackOutcome::Closed),
            Err(_) => CallbackOutcome::Closed,
        };
        Ok(resolved)
    }

    /// Stop listening and release the port. Safe to call repeatedly or
    /// before `start()`.
    pub fn close(&self) {
        let Some(mut active) = self.lock().take() else {
            return;
        };

        resolve_outcome(&active.sender, CallbackOutcome::Closed);
        active.timer.abort();
        if let Some(shutdown) = active.shutdown.take() {
            let _ = shutdown.send(());
        }

        let server = active.server;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(SHUTDOWN_GRACE).await;
                    server.abort();
                });
            }
            Err(_) => server.abort(),
        }

        tracing::info!(address = %active.local_addr, "OAuth callback listener closed");
    }

    pub fn is_listening(&self) -> bool {
        self.lock().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock().as_ref().map(|active| active.local_addr)
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveListener>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.close();
    }
}

/// Scoped listener acquisition: the port is released on every exit path.
pub struct ListenerGuard<'a> {
    listener: &'a CallbackListener,
}

impl ListenerGuard<'_> {
    pub async fn wait_for_callback(&self) -> Result<CallbackOutcome> {
        self.listener.wait_for_callback().await
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        self.listener.close();
    }
}
