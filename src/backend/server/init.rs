/**
 * Server Initialization
 *
 * This module turns resolved settings into a running server.
 *
 * # Initialization Process
 *
 * 1. Open the shared connections (application database)
 * 2. Select the backplane adapter (validated, no network I/O)
 * 3. Bring the backplane up; the event routes are resolved and the
 *    connection handler installed only once both backplane connections exist
 * 4. Build the router
 * 5. Bind the listening port
 * 6. Invoke the ready callback with the bound address
 *
 * A configuration or connection error in steps 1-3 stops the server before
 * the port is ever bound.
 *
 * # Example
 *
 * ```rust,no_run
 * use cinder::backend::realtime::{handler, Controller};
 * use cinder::backend::server::Cinder;
 * use cinder::shared::Settings;
 *
 * # async fn run() -> Result<(), cinder::backend::error::BackendError> {
 * let chat = Controller::new().action(
 *     "send",
 *     handler(|ctx, ack| async move {
 *         let _ = ctx.server.to("lobby").emit("chat.message", ctx.body.clone()).await;
 *         ack.send(serde_json::json!({"ok": true}));
 *     }),
 * );
 *
 * Cinder::builder(Settings::load()?)
 *     .controller("Chat", chat)
 *     .build()
 *     .serve(|addr| println!("listening on {}", addr))
 *     .await
 * # }
 * ```
 */

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;

use crate::backend::error::BackendError;
use crate::backend::middleware::SocketMiddleware;
use crate::backend::realtime::router::EventHandler;
use crate::backend::realtime::socket::OnConnect;
use crate::backend::realtime::{
    bring_up, select_backplane, BackplaneAdapter, ConnectionHandler, Controller,
    ControllerRegistry, EventRouter, EventTarget, ExistingConnections, RealtimeServer,
};
use crate::backend::routes::create_router;
use crate::backend::server::config::load_connections;
use crate::backend::server::state::AppState;
use crate::shared::Settings;

/// Configured but not yet started server
pub struct Cinder {
    settings: Settings,
    registry: ControllerRegistry,
    routes: Vec<(String, EventTarget)>,
    on_connect: Option<OnConnect>,
    middlewares: Vec<Arc<dyn SocketMiddleware>>,
    backplane: Option<Arc<dyn BackplaneAdapter>>,
    connections: Option<ExistingConnections>,
}

/// Builder for [`Cinder`]
pub struct CinderBuilder {
    inner: Cinder,
}

impl Cinder {
    pub fn builder(settings: Settings) -> CinderBuilder {
        CinderBuilder {
            inner: Cinder {
                settings,
                registry: ControllerRegistry::new(),
                routes: Vec::new(),
                on_connect: None,
                middlewares: Vec::new(),
                backplane: None,
                connections: None,
            },
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Bring the real-time layer up (if enabled) and build the router
    pub async fn create_app(self) -> Result<App, BackendError> {
        let started = Instant::now();
        let Cinder {
            settings,
            registry,
            routes,
            on_connect,
            middlewares,
            backplane,
            connections,
        } = self;

        tracing::info!("[Startup] Initializing ({} environment)", settings.environment);

        let connections = match connections {
            Some(connections) => connections,
            None => load_connections(&settings).await,
        };

        let realtime = if settings.sockets.enabled {
            let sockets = &settings.sockets;
            let adapter: Arc<dyn BackplaneAdapter> = match backplane {
                Some(adapter) => {
                    sockets.validate()?;
                    adapter
                }
                None => Arc::from(select_backplane(sockets, &connections)?),
            };

            // Programmatic routes are appended last so they win over the event map.
            let mut targets = EventRouter::config_targets(&sockets.events);
            targets.extend(routes);

            let server = bring_up(
                adapter,
                &sockets.lifecycle,
                sockets.transport.clone(),
                move |server| {
                    let (router, _unresolved) = EventRouter::resolve(targets, &registry);
                    server.install_handler(ConnectionHandler {
                        router,
                        on_connect,
                        middlewares,
                    })
                },
                |server| {
                    tracing::info!(
                        "[Realtime] Accepting connections on {} ({} adapter)",
                        sockets.path,
                        server.kind()
                    )
                },
            )
            .await?;
            Some(server)
        } else {
            tracing::info!("[Startup] Real-time layer disabled");
            None
        };

        let state = AppState {
            settings: Arc::new(settings),
            realtime,
            connections,
        };
        let router = match create_router(state.clone()) {
            Ok(router) => router,
            Err(e) => {
                if let Some(realtime) = &state.realtime {
                    realtime.shutdown();
                }
                return Err(e);
            }
        };

        Ok(App {
            router,
            state,
            started,
        })
    }

    /// Start and serve until Ctrl+C or SIGTERM
    pub async fn serve<F>(self, ready: F) -> Result<(), BackendError>
    where
        F: FnOnce(SocketAddr),
    {
        self.serve_with_shutdown(ready, shutdown_signal()).await
    }

    /// Start and serve until `shutdown` completes
    pub async fn serve_with_shutdown<F, S>(self, ready: F, shutdown: S) -> Result<(), BackendError>
    where
        F: FnOnce(SocketAddr),
        S: Future<Output = ()> + Send + 'static,
    {
        let app = self.create_app().await?;
        let realtime = app.state.realtime.clone();

        let served = serve_app(app, ready, shutdown).await;

        // Also on bind failure, so the relay and backplane connections close.
        if let Some(realtime) = realtime {
            realtime.shutdown();
        }
        served?;

        tracing::info!("[Startup] Server stopped");
        Ok(())
    }
}

async fn serve_app<F, S>(app: App, ready: F, shutdown: S) -> Result<(), BackendError>
where
    F: FnOnce(SocketAddr),
    S: Future<Output = ()> + Send + 'static,
{
    let settings = app.state.settings.clone();

    let listener = TcpListener::bind((settings.server.host.as_str(), settings.server.port)).await?;
    let addr = listener.local_addr()?;

    log_startup_summary(&app, addr);
    ready(addr);

    axum::serve(
        listener,
        app.router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

impl CinderBuilder {
    /// Register a top-level controller
    pub fn controller(mut self, name: impl Into<String>, controller: Controller) -> Self {
        self.inner.registry.register(name, controller);
        self
    }

    /// Register a controller inside a module
    pub fn module_controller(
        mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        controller: Controller,
    ) -> Self {
        self.inner.registry.register_in_module(module, name, controller);
        self
    }

    /// Bind an event to a handler directly
    pub fn on(mut self, event: impl Into<String>, handler: EventHandler) -> Self {
        self.inner.routes.push((event.into(), EventTarget::Handler(handler)));
        self
    }

    /// Bind an event to a `[module.]controller.action` address
    pub fn route(mut self, event: impl Into<String>, address: impl Into<String>) -> Self {
        self.inner
            .routes
            .push((event.into(), EventTarget::Address(address.into())));
        self
    }

    pub fn on_connect(mut self, hook: OnConnect) -> Self {
        self.inner.on_connect = Some(hook);
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn SocketMiddleware>) -> Self {
        self.inner.middlewares.push(middleware);
        self
    }

    /// Use this adapter instead of the one named in the settings
    pub fn backplane(mut self, adapter: Arc<dyn BackplaneAdapter>) -> Self {
        self.inner.backplane = Some(adapter);
        self
    }

    /// Use these connections instead of opening them from the settings
    pub fn connections(mut self, connections: ExistingConnections) -> Self {
        self.inner.connections = Some(connections);
        self
    }

    pub fn build(self) -> Cinder {
        self.inner
    }
}

/// A built application, ready to be bound
pub struct App {
    pub router: Router<()>,
    pub state: AppState,
    started: Instant,
}

impl App {
    pub fn realtime(&self) -> Option<&RealtimeServer> {
        self.state.realtime.as_ref()
    }
}

fn log_startup_summary(app: &App, addr: SocketAddr) {
    let settings = &app.state.settings;
    let (sockets, adapter) = match app.realtime() {
        Some(server) => ("on", server.kind().to_string()),
        None => ("off", "-".to_string()),
    };

    tracing::info!("[Startup] ----------------------------------------");
    tracing::info!("[Startup] Listening on  {}", addr);
    tracing::info!("[Startup] Environment   {}", settings.environment);
    tracing::info!("[Startup] Sockets       {}", sockets);
    tracing::info!("[Startup] Adapter       {}", adapter);
    tracing::info!("[Startup] Started in    {:?}", app.started.elapsed());
    tracing::info!("[Startup] ----------------------------------------");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("[Startup] Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("[Startup] Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::info!("[Startup] Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("[Startup] Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
