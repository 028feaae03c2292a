/**
 * Real-time Broadcast Handle
 *
 * `RealtimeServer` is the process-wide handle to the real-time layer. It can
 * be cloned and shared across handlers to broadcast from anywhere in the
 * application.
 *
 * # Broadcasting
 *
 * An emitted event is delivered to matching local sessions right away and
 * published on the backplane as an `Envelope`. The relay task of every other
 * node delivers it to that node's sessions; envelopes carrying this node's id
 * are dropped so local sessions never receive an event twice.
 *
 * # Relay Recovery
 *
 * When the subscriber errors or its stream ends, the relay reopens it through
 * the adapter with the bring-up backoff. The stage reads `Degraded` until a
 * new subscriber is attached. Local delivery and publishing keep working in
 * the meantime.
 *
 * ```rust,no_run
 * # async fn demo(server: cinder::backend::realtime::RealtimeServer) {
 * use serde_json::json;
 *
 * server.emit("news", json!({"title": "hello"})).await.ok();
 * server.to("lobby").emit("chat.message", json!({"text": "hi"})).await.ok();
 * # }
 * ```
 */

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::backend::realtime::backplane::{BackplaneAdapter, BackplanePublisher, BackplaneSubscriber};
use crate::backend::realtime::lifecycle::Stage;
use crate::backend::realtime::retry::{retry_connect, RetryPolicy};
use crate::backend::realtime::session::SessionRegistry;
use crate::backend::realtime::socket::ConnectionHandler;
use crate::shared::config::TransportOptions;
use crate::shared::{AdapterKind, Envelope};

/// Lower bound between subscriber reopen rounds
const RELAY_REOPEN_FLOOR: Duration = Duration::from_millis(50);

struct ServerInner {
    node_id: Uuid,
    kind: AdapterKind,
    transport: TransportOptions,
    sessions: SessionRegistry,
    adapter: Arc<dyn BackplaneAdapter>,
    publisher: Arc<dyn BackplanePublisher>,
    retry: RetryPolicy,
    /// Lifecycle position, without relay health
    lifecycle: Mutex<Stage>,
    relay_down: AtomicBool,
    /// Effective stage as reported to callers
    stage: watch::Sender<Stage>,
    handler: OnceLock<Arc<ConnectionHandler>>,
    relay: Mutex<Option<JoinHandle<()>>>,
}

/// Process-wide handle to the real-time layer
#[derive(Clone)]
pub struct RealtimeServer {
    inner: Arc<ServerInner>,
}

impl fmt::Debug for RealtimeServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeServer")
            .field("node_id", &self.inner.node_id)
            .field("kind", &self.inner.kind)
            .field("stage", &self.stage())
            .field("sessions", &self.inner.sessions.len())
            .finish()
    }
}

impl RealtimeServer {
    /// Create a server around an open publisher; stage starts at `Connecting`
    ///
    /// `adapter` and `retry` are kept to reopen the subscriber if the relay
    /// loses it.
    pub fn new(
        adapter: Arc<dyn BackplaneAdapter>,
        publisher: Arc<dyn BackplanePublisher>,
        transport: TransportOptions,
        retry: RetryPolicy,
    ) -> Self {
        let (stage, _) = watch::channel(Stage::Connecting);
        Self {
            inner: Arc::new(ServerInner {
                node_id: Uuid::new_v4(),
                kind: adapter.kind(),
                transport,
                sessions: SessionRegistry::new(),
                adapter,
                publisher,
                retry,
                lifecycle: Mutex::new(Stage::Connecting),
                relay_down: AtomicBool::new(false),
                stage,
                handler: OnceLock::new(),
                relay: Mutex::new(None),
            }),
        }
    }

    pub fn node_id(&self) -> Uuid {
        self.inner.node_id
    }

    pub fn kind(&self) -> AdapterKind {
        self.inner.kind
    }

    pub fn transport(&self) -> &TransportOptions {
        &self.inner.transport
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    pub fn stage(&self) -> Stage {
        *self.inner.stage.borrow()
    }

    /// Watch stage transitions
    pub fn watch_stage(&self) -> watch::Receiver<Stage> {
        self.inner.stage.subscribe()
    }

    pub(crate) fn set_stage(&self, stage: Stage) {
        tracing::debug!("[Lifecycle] Stage -> {:?}", stage);
        if let Ok(mut lifecycle) = self.inner.lifecycle.lock() {
            *lifecycle = stage;
        }
        self.inner.publish_stage();
    }

    /// Whether new socket connections may be accepted
    ///
    /// A degraded relay does not stop new connections.
    pub fn is_accepting(&self) -> bool {
        self.inner.lifecycle_stage() >= Stage::Accepting && self.inner.handler.get().is_some()
    }

    pub(crate) fn connection_handler(&self) -> Option<Arc<ConnectionHandler>> {
        self.inner.handler.get().cloned()
    }

    /// Register the handler that serves socket connections
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if a handler was already installed.
    pub fn install_handler(&self, handler: ConnectionHandler) -> Result<(), BackendError> {
        self.inner
            .handler
            .set(Arc::new(handler))
            .map_err(|_| BackendError::configuration("a connection handler is already installed"))?;
        self.set_stage(Stage::Accepting);
        Ok(())
    }

    /// Spawn the relay task that feeds foreign envelopes to local sessions
    pub(crate) fn attach(&self, subscriber: Box<dyn BackplaneSubscriber>) {
        let handle = tokio::spawn(relay(Arc::downgrade(&self.inner), subscriber));

        if let Ok(mut relay) = self.inner.relay.lock() {
            if let Some(previous) = relay.replace(handle) {
                previous.abort();
            }
        }
        self.set_stage(Stage::AdapterAttached);
    }

    /// Emit to every session on every node
    pub async fn emit(&self, event: impl Into<String>, data: Value) -> Result<usize, BackendError> {
        self.broadcast(Envelope::new(self.inner.node_id, event, data)).await
    }

    /// Target the sessions in a room
    pub fn to(&self, room: impl Into<String>) -> Broadcast<'_> {
        Broadcast {
            server: self,
            room: Some(room.into()),
            except: None,
        }
    }

    /// Target every session but one
    pub fn except(&self, session: Uuid) -> Broadcast<'_> {
        Broadcast {
            server: self,
            room: None,
            except: Some(session),
        }
    }

    /// Deliver locally, then publish; returns the number of local deliveries
    async fn broadcast(&self, envelope: Envelope) -> Result<usize, BackendError> {
        let delivered = self.inner.sessions.deliver(&envelope);

        if let Err(e) = self.inner.publisher.publish(&envelope).await {
            tracing::error!(
                "[Realtime] Failed to publish '{}' on {} backplane: {}",
                envelope.event,
                self.inner.kind,
                e
            );
            return Err(e);
        }

        tracing::debug!(
            "[Realtime] Event '{}' delivered to {} local sessions",
            envelope.event,
            delivered
        );
        Ok(delivered)
    }

    /// Stop the relay and close every session
    pub fn shutdown(&self) {
        if let Ok(mut relay) = self.inner.relay.lock() {
            if let Some(handle) = relay.take() {
                handle.abort();
            }
        }
        for session in self.inner.sessions.snapshot() {
            session.disconnect();
        }
        tracing::info!("[Realtime] Shut down node {}", self.inner.node_id);
    }
}

/// Targeted broadcast builder
pub struct Broadcast<'a> {
    server: &'a RealtimeServer,
    room: Option<String>,
    except: Option<Uuid>,
}

impl Broadcast<'_> {
    pub fn to(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    pub fn except(mut self, session: Uuid) -> Self {
        self.except = Some(session);
        self
    }

    pub async fn emit(self, event: impl Into<String>, data: Value) -> Result<usize, BackendError> {
        let mut envelope = Envelope::new(self.server.node_id(), event, data);
        envelope.room = self.room;
        envelope.except = self.except;
        self.server.broadcast(envelope).await
    }
}

impl ServerInner {
    fn lifecycle_stage(&self) -> Stage {
        self.lifecycle.lock().map(|stage| *stage).unwrap_or(Stage::Connecting)
    }

    fn publish_stage(&self) {
        let stage = if self.relay_down.load(Ordering::Acquire) {
            Stage::Degraded
        } else {
            self.lifecycle_stage()
        };
        self.stage.send_if_modified(|current| {
            let changed = *current != stage;
            *current = stage;
            changed
        });
    }

    fn set_relay_down(&self, down: bool) {
        self.relay_down.store(down, Ordering::Release);
        self.publish_stage();
    }
}

async fn relay(inner: Weak<ServerInner>, mut subscriber: Box<dyn BackplaneSubscriber>) {
    let node_id = match inner.upgrade() {
        Some(inner) => inner.node_id,
        None => return,
    };
    tracing::info!("[Realtime] Backplane relay started for node {}", node_id);

    loop {
        let next = subscriber.next().await;
        let Some(server) = inner.upgrade() else { break };

        let lost = match next {
            Ok(Some(envelope)) if envelope.node == node_id => false,
            Ok(Some(envelope)) => {
                let delivered = server.sessions.deliver(&envelope);
                tracing::trace!(
                    "[Realtime] Relayed '{}' from node {} to {} sessions",
                    envelope.event,
                    envelope.node,
                    delivered
                );
                false
            }
            Ok(None) => {
                tracing::warn!("[Realtime] Backplane stream ended");
                true
            }
            Err(e) => {
                tracing::error!("[Realtime] Backplane relay failed: {}", e);
                true
            }
        };
        if !lost {
            continue;
        }

        server.set_relay_down(true);
        drop(server);

        match reopen_subscriber(&inner).await {
            Some(reopened) => {
                subscriber = reopened;
                if let Some(server) = inner.upgrade() {
                    server.set_relay_down(false);
                }
                tracing::info!("[Realtime] Backplane relay resumed for node {}", node_id);
            }
            None => break,
        }
    }
    tracing::debug!("[Realtime] Backplane relay stopped for node {}", node_id);
}

/// Reopen the subscriber until it succeeds, the adapter reports a
/// configuration error, or the server is gone
async fn reopen_subscriber(inner: &Weak<ServerInner>) -> Option<Box<dyn BackplaneSubscriber>> {
    loop {
        let (adapter, policy) = {
            let server = inner.upgrade()?;
            (server.adapter.clone(), server.retry.clone())
        };

        match retry_connect("relay subscriber", &policy, || adapter.open_subscriber()).await {
            Ok(subscriber) => return Some(subscriber),
            Err(e) if !matches!(e, BackendError::ConfigurationError { .. }) => {
                let pause = policy
                    .backoff
                    .delay(policy.max_retries.saturating_add(1))
                    .max(RELAY_REOPEN_FLOOR);
                tracing::warn!("[Realtime] Subscriber still down ({}), next round in {:?}", e, pause);
                tokio::time::sleep(pause).await;
            }
            Err(e) => {
                tracing::error!("[Realtime] Giving up on backplane relay: {}", e);
                return None;
            }
        }
    }
}
