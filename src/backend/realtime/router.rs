/**
 * Convention-based Event Router
 *
 * Socket events are bound once per start, from two sources:
 *
 * - handlers registered programmatically, used as-is
 * - dotted addresses from the `[sockets.events]` table, looked up in the
 *   `ControllerRegistry`
 *
 * # Addresses
 *
 * ```text
 * controller.action            -> controller "controller", action "action"
 * module.controller.action     -> module "module", controller "controller"
 * module.controller.x.action   -> first segment is the module, second the
 *                                 controller, last the action
 * ```
 *
 * An address with fewer than two segments, or one that names anything not
 * registered, is logged as a route resolution error and the event stays
 * unbound. Startup continues.
 */

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::backend::error::BackendError;
use crate::backend::realtime::broadcast::RealtimeServer;
use crate::backend::realtime::session::{Outbound, Session};
use crate::shared::ServerFrame;

/// Everything a handler gets to know about one incoming event
#[derive(Clone, Debug)]
pub struct EventContext {
    pub event: String,
    /// The socket that sent the event
    pub session: Session,
    /// Payload, `{}` when the client sent none
    pub body: Value,
    pub server: RealtimeServer,
}

/// Acknowledgement callback for one client frame
///
/// Sending is a no-op when the client did not ask for an acknowledgement.
#[derive(Debug)]
pub struct Ack {
    id: Option<u64>,
    session: Session,
}

impl Ack {
    pub fn new(id: Option<u64>, session: Session) -> Self {
        Self { id, session }
    }

    /// Whether the client is waiting for an answer
    pub fn requested(&self) -> bool {
        self.id.is_some()
    }

    /// Answer the client; returns `false` if nothing was sent
    pub fn send(self, data: Value) -> bool {
        match self.id {
            Some(id) => self.session.send(Outbound::Frame(ServerFrame::ack(id, data))),
            None => false,
        }
    }
}

/// Type-erased socket event handler
pub type EventHandler = Arc<dyn Fn(EventContext, Ack) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async function as an `EventHandler`
pub fn handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(EventContext, Ack) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ctx, ack| Box::pin(f(ctx, ack)))
}

/// Named set of actions
#[derive(Clone, Default)]
pub struct Controller {
    actions: HashMap<String, EventHandler>,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action
    pub fn action(mut self, name: impl Into<String>, handler: EventHandler) -> Self {
        self.actions.insert(name.into(), handler);
        self
    }

    pub fn get(&self, action: &str) -> Option<EventHandler> {
        self.actions.get(action).cloned()
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}

/// Controllers known to the application, read-only once the server is built
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    controllers: HashMap<String, Controller>,
    modules: HashMap<String, HashMap<String, Controller>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a top-level controller
    pub fn register(&mut self, name: impl Into<String>, controller: Controller) -> &mut Self {
        self.controllers.insert(name.into(), controller);
        self
    }

    /// Register a controller inside a module
    pub fn register_in_module(
        &mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        controller: Controller,
    ) -> &mut Self {
        self.modules
            .entry(module.into())
            .or_default()
            .insert(name.into(), controller);
        self
    }

    pub fn lookup(&self, address: &RouteAddress) -> Option<EventHandler> {
        let controller = match &address.module {
            Some(module) => self.modules.get(module)?.get(&address.controller)?,
            None => self.controllers.get(&address.controller)?,
        };
        controller.get(&address.action)
    }
}

/// Parsed `[module.]controller.action`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteAddress {
    pub module: Option<String>,
    pub controller: String,
    pub action: String,
}

impl RouteAddress {
    /// Split a dotted address; `None` when it cannot name an action
    pub fn parse(address: &str) -> Option<Self> {
        let segments: Vec<&str> = address.split('.').map(str::trim).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }

        match segments.as_slice() {
            [controller, action] => Some(Self {
                module: None,
                controller: controller.to_string(),
                action: action.to_string(),
            }),
            [module, controller, .., action] => Some(Self {
                module: Some(module.to_string()),
                controller: controller.to_string(),
                action: action.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for RouteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{}.{}.{}", module, self.controller, self.action),
            None => write!(f, "{}.{}", self.controller, self.action),
        }
    }
}

/// What an event name is bound to before resolution
#[derive(Clone)]
pub enum EventTarget {
    Handler(EventHandler),
    Address(String),
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTarget::Handler(_) => f.write_str("Handler(..)"),
            EventTarget::Address(address) => f.debug_tuple("Address").field(address).finish(),
        }
    }
}

/// Resolved event table
#[derive(Clone, Default)]
pub struct EventRouter {
    routes: HashMap<String, EventHandler>,
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter").field("events", &self.events()).finish()
    }
}

impl EventRouter {
    /// Bind every route, collecting the ones that could not be resolved
    pub fn resolve<I>(routes: I, registry: &ControllerRegistry) -> (Self, Vec<BackendError>)
    where
        I: IntoIterator<Item = (String, EventTarget)>,
    {
        let mut bound = HashMap::new();
        let mut unresolved = Vec::new();

        for (event, target) in routes {
            match target {
                EventTarget::Handler(handler) => {
                    bound.insert(event, handler);
                }
                EventTarget::Address(address) => {
                    match RouteAddress::parse(&address).and_then(|parsed| registry.lookup(&parsed)) {
                        Some(handler) => {
                            tracing::debug!("[Router] {} -> {}", event, address);
                            bound.insert(event, handler);
                        }
                        None => {
                            let err = BackendError::route_resolution(&event, &address);
                            tracing::error!("[Router] {}", err);
                            unresolved.push(err);
                        }
                    }
                }
            }
        }

        tracing::info!(
            "[Router] {} socket events bound, {} unresolved",
            bound.len(),
            unresolved.len()
        );
        (Self { routes: bound }, unresolved)
    }

    /// Routes from the `[sockets.events]` table as address targets
    pub fn config_targets(events: &BTreeMap<String, String>) -> Vec<(String, EventTarget)> {
        events
            .iter()
            .map(|(event, address)| (event.clone(), EventTarget::Address(address.clone())))
            .collect()
    }

    pub fn get(&self, event: &str) -> Option<&EventHandler> {
        self.routes.get(event)
    }

    pub fn contains(&self, event: &str) -> bool {
        self.routes.contains_key(event)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Bound event names, sorted
    pub fn events(&self) -> Vec<&str> {
        let mut events: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        events.sort_unstable();
        events
    }

    /// Run the handler bound to `ctx.event`; returns `false` if none is bound
    pub async fn dispatch(&self, ctx: EventContext, ack: Ack) -> bool {
        match self.routes.get(&ctx.event) {
            Some(handler) => {
                handler(ctx, ack).await;
                true
            }
            None => {
                tracing::debug!("[Router] No handler for socket event '{}'", ctx.event);
                false
            }
        }
    }
}
