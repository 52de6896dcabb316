//! Connection supervisor: the single authority over one adapter's lifecycle.
//!
//! Transport specifics (serial OBD, BLE GPS) are plugged in through the
//! [`TransportFactory`] / [`TransportLink`] pair; the supervisor owns the
//! state machine, the abort flag, teardown ordering, and auto-reconnect.
//! The transport handle never leaves the supervisor's tasks, so subscribers
//! only ever observe decoded samples and state changes.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::descriptor::DeviceDescriptor;
use crate::error::AdapterError;
use crate::events::{EventBus, Subscription};
use crate::state::{next_state, ConnectionState, LifecycleEvent};

/// Cooperative cancellation flag for one connect attempt. Cheap to clone.
#[derive(Clone)]
pub struct AbortFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortFlag {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trip the flag. Wakes every pending [`AbortFlag::triggered`] future.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    fn reset(&self) {
        self.tx.send_replace(false);
    }

    /// Resolves once the flag is tripped. Intended for `select!` against
    /// handshake steps so an abort is observed promptly.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|set| *set).await;
    }
}

/// Transport-specific half of an adapter: opens the physical connection.
#[async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    type Link: TransportLink;

    /// Open the transport for `target`. Must not leave anything half-open
    /// on failure.
    async fn open(&self, target: &DeviceDescriptor) -> Result<Self::Link, AdapterError>;
}

/// One opened connection.
#[async_trait]
pub trait TransportLink: Send + 'static {
    /// Run the post-open handshake. Implementations must observe `abort`
    /// between steps and return [`AdapterError::AbortedByUser`] promptly.
    async fn handshake(&mut self, abort: &AbortFlag) -> Result<(), AdapterError>;

    /// Drive steady-state data exchange (active polling or passive stream
    /// ingestion), publishing samples on `bus`, until `stop` flips to true
    /// (return `Ok`) or the transport fails.
    async fn run(
        &mut self,
        bus: EventBus,
        stop: watch::Receiver<bool>,
    ) -> Result<(), AdapterError>;

    /// Release the underlying transport. Must be safe after a failure.
    async fn close(&mut self);
}

struct Session {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    state: ConnectionState,
    target: Option<DeviceDescriptor>,
    session: Option<Session>,
    reconnect: Option<JoinHandle<()>>,
}

struct Shared {
    bus: EventBus,
    abort: AbortFlag,
    auto_reconnect: AtomicBool,
    reconnect_interval: Duration,
    inner: Mutex<Inner>,
}

/// Lifecycle engine for one hardware adapter. Clones share the same
/// connection; the composing layer owns the instance (no process-wide
/// singletons).
pub struct ConnectionSupervisor<F: TransportFactory> {
    factory: Arc<F>,
    shared: Arc<Shared>,
}

impl<F: TransportFactory> Clone for ConnectionSupervisor<F> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: TransportFactory> ConnectionSupervisor<F> {
    pub fn new(factory: F, config: SupervisorConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            shared: Arc::new(Shared {
                bus: EventBus::new(config.event_capacity),
                abort: AbortFlag::new(),
                auto_reconnect: AtomicBool::new(config.auto_reconnect),
                reconnect_interval: Duration::from_millis(config.reconnect_interval_ms),
                inner: Mutex::new(Inner {
                    state: ConnectionState::Idle,
                    target: None,
                    session: None,
                    reconnect: None,
                }),
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.shared.bus.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().unwrap().state
    }

    /// `true` iff the state machine is in `Connected`.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn current_target(&self) -> Option<DeviceDescriptor> {
        self.shared.inner.lock().unwrap().target.clone()
    }

    /// Enable or disable the reconnect policy. Disabling cancels a pending
    /// reconnect timer immediately; a connection left in `Error` waiting on
    /// that timer settles back to `Idle`.
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.shared.auto_reconnect.store(enabled, Ordering::SeqCst);
        if enabled {
            return;
        }
        let was_waiting = {
            let mut inner = self.shared.inner.lock().unwrap();
            match inner.reconnect.take() {
                Some(handle) => {
                    handle.abort();
                    inner.state == ConnectionState::Error
                }
                None => false,
            }
        };
        if was_waiting {
            self.shared.inner.lock().unwrap().target = None;
            self.apply(LifecycleEvent::TeardownComplete);
        }
    }

    /// Open the transport to `target`, run the handshake, and start the
    /// data loop. Rejects with [`AdapterError::AlreadyConnecting`] while an
    /// attempt is in flight; an established connection is torn down first.
    pub async fn connect(&self, target: DeviceDescriptor) -> Result<(), AdapterError> {
        if self.is_connected() {
            self.disconnect().await;
        }

        // Reset the abort flag before the state becomes abortable, so an
        // abort_connect racing this call can never be erased.
        self.shared.abort.reset();
        {
            let mut inner = self.shared.inner.lock().unwrap();
            match next_state(inner.state, LifecycleEvent::ConnectRequested) {
                Some(next) => {
                    inner.state = next;
                    inner.target = Some(target.clone());
                }
                None => return Err(AdapterError::AlreadyConnecting),
            }
        }
        self.shared.bus.state_changed(ConnectionState::Connecting);
        info!(device = %target.label, transport = target.transport.as_str(), "opening transport");

        let mut link = match self.factory.open(&target).await {
            Ok(link) => link,
            Err(err) => return Err(self.fail_attempt(err)),
        };
        if self.shared.abort.is_set() {
            link.close().await;
            return Err(self.finish_aborted());
        }

        self.apply(LifecycleEvent::TransportOpened);
        let handshake = link.handshake(&self.shared.abort).await;
        if self.shared.abort.is_set() {
            link.close().await;
            return Err(self.finish_aborted());
        }
        if let Err(err) = handshake {
            link.close().await;
            if matches!(err, AdapterError::AbortedByUser) {
                return Err(self.finish_aborted());
            }
            return Err(self.fail_attempt(err));
        }

        // Connected. Publish the session before spawning the data task so a
        // fast transport failure cannot race past an unregistered session.
        let (stop_tx, stop_rx) = watch::channel(false);
        {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.state = ConnectionState::Connected;
            inner.session = Some(Session {
                stop: stop_tx,
                task: None,
            });
        }
        self.shared.bus.state_changed(ConnectionState::Connected);
        info!(device = %target.label, "connected");

        let handle = tokio::spawn(self.clone().drive(link, stop_rx));
        if let Some(session) = self.shared.inner.lock().unwrap().session.as_mut() {
            session.task = Some(handle);
        }
        Ok(())
    }

    /// Cancel an in-flight connect attempt. The pending `connect` call
    /// observes the flag after its next await point, closes the transport
    /// if it was already open, and resolves `AbortedByUser`. A no-op when
    /// no attempt is in flight.
    pub fn abort_connect(&self) {
        if self.state().can_abort() {
            info!("connect attempt abort requested");
            self.shared.abort.trigger();
        }
    }

    /// Tear everything down and return to `Idle`. Valid from any state and
    /// safe to call repeatedly.
    pub async fn disconnect(&self) {
        let (session, state) = {
            let mut inner = self.shared.inner.lock().unwrap();
            if let Some(handle) = inner.reconnect.take() {
                handle.abort();
            }
            let state = inner.state;
            if state.can_abort() {
                (None, state)
            } else if state == ConnectionState::Idle {
                return;
            } else {
                inner.state = ConnectionState::Disconnecting;
                (inner.session.take(), state)
            }
        };

        if state.can_abort() {
            // An attempt is in flight; wind it down cooperatively. The
            // connect path performs the teardown and lands on Idle.
            self.shared.abort.trigger();
            return;
        }

        self.shared.bus.state_changed(ConnectionState::Disconnecting);
        if let Some(session) = session {
            let _ = session.stop.send(true);
            if let Some(task) = session.task {
                let _ = task.await;
            }
        }
        self.shared.inner.lock().unwrap().target = None;
        self.apply(LifecycleEvent::TeardownComplete);
        debug!("disconnected");
    }

    /// Data loop wrapper: runs the link, then owns the unexpected-loss path
    /// (error event, Error state, reconnect arming).
    async fn drive(self, mut link: F::Link, stop: watch::Receiver<bool>) {
        let result = link.run(self.shared.bus.clone(), stop.clone()).await;
        link.close().await;

        if *stop.borrow() {
            // User-initiated stop; disconnect() owns the state from here.
            return;
        }

        let err = match result {
            Ok(()) => AdapterError::DisconnectedUnexpectedly("data stream ended".to_string()),
            Err(err) => err,
        };
        warn!(error = %err, "connection lost");
        self.shared.bus.error(&err);

        let target = {
            let mut inner = self.shared.inner.lock().unwrap();
            if inner.state != ConnectionState::Connected {
                // A concurrent disconnect claimed the teardown.
                return;
            }
            inner.state = ConnectionState::Error;
            inner.session = None;
            inner.target.clone()
        };
        self.shared.bus.state_changed(ConnectionState::Error);

        if self.shared.auto_reconnect.load(Ordering::SeqCst) {
            if let Some(target) = target {
                info!(device = %target.label, "arming reconnect");
                let handle = tokio::spawn(self.clone().reconnect_loop(target));
                self.shared.inner.lock().unwrap().reconnect = Some(handle);
                return;
            }
        }

        self.shared.inner.lock().unwrap().target = None;
        self.apply(LifecycleEvent::TeardownComplete);
    }

    /// Periodic retry after an unexpected loss. A tick that lands while an
    /// attempt is still in flight does nothing; the loop ends on success or
    /// when auto-reconnect is disabled.
    // Returns a boxed future so its `Send` bound is asserted here rather than
    // inferred through the connect -> drive -> reconnect_loop -> connect
    // spawn cycle, which rustc cannot resolve across the opaque types.
    fn reconnect_loop(
        self,
        target: DeviceDescriptor,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let mut ticker = tokio::time::interval(self.shared.reconnect_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first interval tick fires immediately; the first retry should
            // wait a full interval.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !self.shared.auto_reconnect.load(Ordering::SeqCst) {
                    return;
                }
                let state = self.state();
                if state.is_connected() {
                    return;
                }
                if state.can_abort() {
                    continue;
                }
                debug!(device = %target.label, "reconnect attempt");
                // The attempt runs in its own task: cancelling this loop (via
                // disconnect) must never kill a connect mid-transition.
                let sup = self.clone();
                let retry = target.clone();
                let attempt = tokio::spawn(async move { sup.connect(retry).await });
                match attempt.await {
                    Ok(Ok(())) => return,
                    Ok(Err(AdapterError::AlreadyConnecting)) => {}
                    Ok(Err(err)) => warn!(error = %err, "reconnect attempt failed"),
                    Err(_) => return,
                }
            }
        })
    }

    /// Serialized transition through the pure state machine, published to
    /// subscribers. Illegal transitions are dropped with a debug log.
    fn apply(&self, event: LifecycleEvent) -> Option<ConnectionState> {
        let next = {
            let mut inner = self.shared.inner.lock().unwrap();
            match next_state(inner.state, event) {
                Some(next) => {
                    inner.state = next;
                    Some(next)
                }
                None => {
                    debug!(?event, state = ?inner.state, "ignoring illegal transition");
                    None
                }
            }
        };
        if let Some(state) = next {
            self.shared.bus.state_changed(state);
        }
        next
    }

    fn fail_attempt(&self, err: AdapterError) -> AdapterError {
        warn!(error = %err, "connect attempt failed");
        self.shared.bus.error(&err);
        self.apply(LifecycleEvent::AttemptFailed);
        self.shared.inner.lock().unwrap().target = None;
        self.apply(LifecycleEvent::TeardownComplete);
        err
    }

    fn finish_aborted(&self) -> AdapterError {
        info!("connect attempt aborted");
        self.apply(LifecycleEvent::AbortRequested);
        self.shared.inner.lock().unwrap().target = None;
        self.apply(LifecycleEvent::TeardownComplete);
        AdapterError::AbortedByUser
    }
}
