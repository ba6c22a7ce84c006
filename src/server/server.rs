//! The server facade: route/middleware/static-mount/error-handler
//! registration and the start/stop lifecycle tying the reactor,
//! sweeper, and worker pool together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::http::{Method, Request, Response, StatusCode};
use crate::server::connection::{run_reactor, run_sweeper, ConnectionTable};
use crate::server::middleware::Middleware;
use crate::server::router::{Route, Router};
use crate::server::stats::ServerStats;
use crate::server::static_file::StaticMount;
use crate::server::worker::WorkerPool;

/// A handler invoked by the error-handler map instead of a route's own
/// handler: given the request that missed, produces the response to
/// send in its place.
pub type ErrorHandler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Accumulates routes, middlewares, static mounts, and error handlers
/// before handing them to a running [`Server`].
pub struct ServerBuilder {
    config: ServerConfig,
    router: Router,
    global_middlewares: Vec<Middleware>,
    static_mounts: Vec<StaticMount>,
    error_handlers: HashMap<u16, ErrorHandler>,
    default_error_handler: Option<ErrorHandler>,
    stats: Arc<ServerStats>,
}

impl ServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            global_middlewares: Vec::new(),
            static_mounts: Vec::new(),
            error_handlers: HashMap::new(),
            default_error_handler: None,
            stats: Arc::new(ServerStats::new()),
        }
    }

    /// Returns the statistics handle this builder's eventual [`Server`]
    /// will update, so a route handler (e.g. `/api/status`) registered
    /// before `build()` can capture it.
    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }

    /// Registers a route under the given method and path template.
    pub fn route(
        mut self,
        method: Method,
        template: &str,
        handler: impl Fn(&Request, &mut Response) + Send + Sync + 'static,
    ) -> Self {
        self.router.add(Route::new(method, template, Box::new(handler)));
        self
    }

    /// Registers a fully built [`Route`], e.g. one carrying its own
    /// route-scoped middleware via [`Route::middleware`].
    pub fn route_with(mut self, route: Route) -> Self {
        self.router.add(route);
        self
    }

    pub fn get(self, template: &str, handler: impl Fn(&Request, &mut Response) + Send + Sync + 'static) -> Self {
        self.route(Method::Get, template, handler)
    }

    pub fn post(self, template: &str, handler: impl Fn(&Request, &mut Response) + Send + Sync + 'static) -> Self {
        self.route(Method::Post, template, handler)
    }

    pub fn put(self, template: &str, handler: impl Fn(&Request, &mut Response) + Send + Sync + 'static) -> Self {
        self.route(Method::Put, template, handler)
    }

    pub fn delete(self, template: &str, handler: impl Fn(&Request, &mut Response) + Send + Sync + 'static) -> Self {
        self.route(Method::Delete, template, handler)
    }

    pub fn patch(self, template: &str, handler: impl Fn(&Request, &mut Response) + Send + Sync + 'static) -> Self {
        self.route(Method::Patch, template, handler)
    }

    /// Registers a middleware run, in registration order, against every
    /// request before its route's own middleware and handler.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.global_middlewares.push(middleware);
        self
    }

    /// Mounts a static file root under a URL prefix.
    pub fn static_mount(mut self, mount: StaticMount) -> Self {
        self.static_mounts.push(mount);
        self
    }

    /// Registers a handler for a specific HTTP status code, consulted
    /// when routing falls through to it (currently only `404`).
    pub fn error_handler(mut self, status: StatusCode, handler: ErrorHandler) -> Self {
        self.error_handlers.insert(status.code(), handler);
        self
    }

    /// Registers a handler consulted when no status-specific handler
    /// matches.
    pub fn default_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.default_error_handler = Some(handler);
        self
    }

    pub fn build(self) -> Server {
        Server {
            config: Arc::new(self.config),
            router: Arc::new(self.router),
            global_middlewares: self.global_middlewares,
            static_mounts: Arc::new(self.static_mounts),
            error_handlers: Arc::new(self.error_handlers),
            default_error_handler: self.default_error_handler,
            stats: self.stats,
            running: Arc::new(AtomicBool::new(false)),
            runtime: None,
        }
    }
}

/// The running set of handles a started [`Server`] owns: the shutdown
/// sender, the reactor/sweeper tasks, the connection table, and the
/// worker pool (reclaimed on `stop` to run its own drain/join).
struct Runtime {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    sigpipe_guard: JoinHandle<()>,
    connections: ConnectionTable,
    pool: Arc<WorkerPool>,
}

/// An embeddable HTTP/1.1 server: own the route table, middleware
/// chain, static mounts, and error handlers built by [`ServerBuilder`],
/// and drive the connection reactor, idle-connection sweeper, and
/// worker pool through an idempotent start/stop lifecycle.
pub struct Server {
    config: Arc<ServerConfig>,
    router: Arc<Router>,
    global_middlewares: Vec<Middleware>,
    static_mounts: Arc<Vec<StaticMount>>,
    error_handlers: Arc<HashMap<u16, ErrorHandler>>,
    default_error_handler: Option<ErrorHandler>,
    stats: Arc<ServerStats>,
    running: Arc<AtomicBool>,
    runtime: Option<Runtime>,
}

impl Server {
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Binds the listening socket and spawns the worker pool, reactor,
    /// and sweeper. A second call while already running is a no-op.
    pub async fn start(&mut self) -> std::io::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let sigpipe_guard = tokio::spawn(mask_sigpipe());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = Arc::new(WorkerPool::start(self.config.thread_pool_size));
        let connections: ConnectionTable = Arc::new(Mutex::new(HashMap::new()));

        let reactor_config = self.config.clone();
        let reactor_router = self.router.clone();
        let reactor_middlewares = self.global_middlewares.clone();
        let reactor_mounts = self.static_mounts.clone();
        let reactor_error_handlers = self.error_handlers.clone();
        let reactor_default_error_handler = self.default_error_handler.clone();
        let reactor_pool = pool.clone();
        let reactor_connections = connections.clone();
        let reactor_stats = self.stats.clone();

        let reactor = tokio::spawn(async move {
            let result = run_reactor(
                reactor_config,
                reactor_router,
                reactor_middlewares,
                reactor_mounts,
                reactor_error_handlers,
                reactor_default_error_handler,
                reactor_pool,
                reactor_connections,
                reactor_stats,
                shutdown_rx,
            )
            .await;
            if let Err(err) = result {
                log::error!("reactor exited with error: {err}");
            }
        });

        let sweeper = tokio::spawn(run_sweeper(connections.clone(), self.config.timeout_seconds));

        self.runtime = Some(Runtime {
            shutdown_tx,
            tasks: vec![reactor, sweeper],
            sigpipe_guard,
            connections,
            pool,
        });

        Ok(())
    }

    /// Signals shutdown, joins the reactor and sweeper, clears the
    /// connection table, and drains/joins the worker pool. A second
    /// call, or a call before `start`, is a no-op.
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let Some(runtime) = self.runtime.take() else {
            return;
        };

        let _ = runtime.shutdown_tx.send(true);
        for task in runtime.tasks {
            let _ = task.await;
        }
        runtime.sigpipe_guard.abort();

        runtime.connections.lock().await.clear();

        match Arc::try_unwrap(runtime.pool) {
            Ok(pool) => pool.shutdown().await,
            Err(pool) => {
                log::warn!("worker pool still referenced at shutdown; skipping drain");
                drop(pool);
            }
        }
    }

    /// Starts the server and blocks until a `SIGINT`/`SIGTERM` arrives,
    /// then stops it. The convenience entry point for a standalone
    /// binary; an embedder that needs finer control calls `start`/`stop`
    /// directly.
    pub async fn run_until_signal(&mut self) -> std::io::Result<()> {
        self.start().await?;
        wait_for_shutdown_signal().await;
        self.stop().await;
        Ok(())
    }
}

/// Masks `SIGPIPE` so a write to a peer that has already closed its
/// read side surfaces as an `EPIPE` I/O error instead of terminating
/// the process, matching the behavior every other POSIX network server
/// process configures for itself. Installing a `tokio` signal stream
/// replaces the default disposition (terminate) with delivery through
/// this task; the signal is drained and otherwise ignored for as long
/// as the stream is alive, which is why the handle is kept in
/// [`Runtime`] and aborted (not awaited) on `stop` rather than let to
/// drop immediately.
#[cfg(unix)]
async fn mask_sigpipe() {
    let Ok(mut pipe) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::pipe()) else {
        return;
    };
    loop {
        pipe.recv().await;
    }
}

#[cfg(not(unix))]
async fn mask_sigpipe() {}

/// Waits for either `SIGINT` (`Ctrl+C`) or `SIGTERM`, whichever arrives
/// first.
async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
