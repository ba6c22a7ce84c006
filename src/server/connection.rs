//! The connection reactor: listening socket, accept loop, connection
//! table, and idle-connection sweeper.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::http::{Method, ParseLimits, Request, Response, StatusCode};
use crate::server::middleware::run_chain;
use crate::server::router::{Dispatch, Router};
use crate::server::server::ErrorHandler;
use crate::server::stats::ServerStats;
use crate::server::static_file::{serve, StaticMount, StaticOutcome};
use crate::server::worker::WorkerPool;

pub type ConnId = u64;

/// Metadata tracked per accepted connection. The socket handle itself
/// lives in the task servicing the connection; `notify` is how the
/// sweeper reaches across to that task to force an idle connection
/// closed.
pub struct ConnectionMeta {
    pub client_ip: String,
    pub last_activity: Instant,
    pub notify: Arc<Notify>,
}

pub type ConnectionTable = Arc<Mutex<HashMap<ConnId, ConnectionMeta>>>;

/// Binds a non-blocking, address-reuse TCP listener with a backlog
/// equal to `max_connections`.
fn bind_listener(host: &str, port: u16, backlog: i32) -> std::io::Result<TcpListener> {
    let addr: std::net::SocketAddr = if host == "0.0.0.0" || host == "*" {
        format!("0.0.0.0:{port}").parse().unwrap()
    } else {
        format!("{host}:{port}").parse().unwrap()
    };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    TcpListener::from_std(socket.into())
}

/// Runs the accept loop until `shutdown` fires. Each accepted
/// connection is recorded in `connections` and handed to the worker
/// pool for servicing.
#[allow(clippy::too_many_arguments)]
pub async fn run_reactor(
    config: Arc<ServerConfig>,
    router: Arc<Router>,
    global_middlewares: Vec<crate::server::middleware::Middleware>,
    static_mounts: Arc<Vec<StaticMount>>,
    error_handlers: Arc<HashMap<u16, ErrorHandler>>,
    default_error_handler: Option<ErrorHandler>,
    pool: Arc<WorkerPool>,
    connections: ConnectionTable,
    stats: Arc<ServerStats>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = bind_listener(&config.host, config.port, config.max_connections as i32)?;
    let next_id = Arc::new(AtomicU64::new(1));

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                let (socket, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(_) => continue,
                };

                let conn_id = next_id.fetch_add(1, Ordering::Relaxed);
                let client_ip = addr.ip().to_string();
                let notify = Arc::new(Notify::new());

                {
                    let mut table = connections.lock().await;
                    table.insert(
                        conn_id,
                        ConnectionMeta {
                            client_ip: client_ip.clone(),
                            last_activity: Instant::now(),
                            notify: notify.clone(),
                        },
                    );
                }
                stats.connection_opened();

                let config = config.clone();
                let router = router.clone();
                let global_middlewares = global_middlewares.clone();
                let static_mounts = static_mounts.clone();
                let error_handlers = error_handlers.clone();
                let default_error_handler = default_error_handler.clone();
                let connections = connections.clone();
                let stats = stats.clone();

                pool.enqueue_async(async move {
                    serve_connection(
                        socket,
                        conn_id,
                        client_ip,
                        config,
                        router,
                        global_middlewares,
                        static_mounts,
                        error_handlers,
                        default_error_handler,
                        connections.clone(),
                        stats.clone(),
                        notify,
                    )
                    .await;

                    // The real close path: whether the peer hung up, the
                    // connection reached its keep-alive limit, or the
                    // sweeper woke it for being idle, this is the one
                    // place the table entry is pruned and the stat
                    // decremented, so a sweep-triggered close is never
                    // counted twice.
                    connections.lock().await.remove(&conn_id);
                    stats.connection_closed();
                });
            }
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn serve_connection(
    mut socket: tokio::net::TcpStream,
    conn_id: ConnId,
    client_ip: String,
    config: Arc<ServerConfig>,
    router: Arc<Router>,
    global_middlewares: Vec<crate::server::middleware::Middleware>,
    static_mounts: Arc<Vec<StaticMount>>,
    error_handlers: Arc<HashMap<u16, ErrorHandler>>,
    default_error_handler: Option<ErrorHandler>,
    connections: ConnectionTable,
    stats: Arc<ServerStats>,
    notify: Arc<Notify>,
) {
    let limits = ParseLimits {
        max_header_size: config.max_header_size,
        max_request_size: config.max_request_size,
    };

    loop {
        let buffer = tokio::select! {
            result = read_one_request(&mut socket, &limits) => match result {
                Ok(Some(buffer)) => buffer,
                Ok(None) => return,
                Err(_) => return,
            },
            _ = notify.notified() => {
                let _ = socket.shutdown().await;
                return;
            }
        };

        {
            let mut table = connections.lock().await;
            if let Some(meta) = table.get_mut(&conn_id) {
                meta.last_activity = Instant::now();
            }
        }
        stats.request_received(buffer.len() as u64);

        let version = crate::http::Version::Http11;
        let response_bytes = match Request::parse(&buffer, client_ip.clone(), limits) {
            Ok(mut request) => {
                let mut response = Response::new();
                let keep_alive = should_keep_alive(&config, &request);

                let method = request.method;
                let path = request.path.clone();
                let outcome = router.dispatch_outcome(&mut request, method, &path);

                let completed = run_chain(&global_middlewares, &request, &mut response);
                if completed {
                    dispatch_outcome(
                        outcome,
                        &request,
                        &mut response,
                        &static_mounts,
                        &error_handlers,
                        &default_error_handler,
                        &config.server_name,
                    );
                }

                finalize_response(&config, &mut response, keep_alive);
                response.to_bytes(version)
            }
            Err(kind) => kind.as_http(version, &config.server_name, false),
        };

        stats.response_sent(response_bytes.len() as u64);
        if socket.write_all(&response_bytes).await.is_err() {
            return;
        }

        if !keep_alive {
            return;
        }
    }
}

/// Resolves a matched/mismatched/missed route into a final response: a
/// match runs route middleware then the handler; both a method
/// mismatch and an outright miss fall through to static files first
/// and, failing that, a mismatch answers `405` with an `Allow` header
/// while a miss runs the error-handler map.
fn dispatch_outcome(
    outcome: Dispatch<'_>,
    request: &Request,
    response: &mut Response,
    static_mounts: &[StaticMount],
    error_handlers: &HashMap<u16, ErrorHandler>,
    default_error_handler: &Option<ErrorHandler>,
    server_name: &str,
) {
    match outcome {
        Dispatch::Matched(route) => {
            let route_completed = run_chain(&route.middlewares, request, response);
            if route_completed {
                (route.handler)(request, response);
            }
        }
        Dispatch::MethodNotAllowed(allowed) => {
            match serve(static_mounts, &request.path) {
                StaticOutcome::Served(static_response) if static_response.status() != StatusCode::NotFound => {
                    *response = static_response;
                }
                _ => {
                    respond_method_not_allowed(response, &allowed);
                }
            }
        }
        Dispatch::NotFound => {
            match serve(static_mounts, &request.path) {
                StaticOutcome::Served(static_response) if static_response.status() != StatusCode::NotFound => {
                    *response = static_response;
                }
                _ => {
                    *response = render_not_found(error_handlers, default_error_handler, request, server_name);
                }
            }
        }
    }
}

fn respond_method_not_allowed(response: &mut Response, allowed: &[Method]) {
    let allow = allowed
        .iter()
        .map(Method::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    response.set_status(StatusCode::MethodNotAllowed);
    response.set_header("Allow", allow);
    response.text("Method Not Allowed");
}

/// Renders a `404`: the registered handler for that status code if
/// any, else the facade's default error handler if one was installed,
/// else a default HTML page carrying the configured server name.
fn render_not_found(
    error_handlers: &HashMap<u16, ErrorHandler>,
    default_error_handler: &Option<ErrorHandler>,
    request: &Request,
    server_name: &str,
) -> Response {
    if let Some(handler) = error_handlers.get(&StatusCode::NotFound.code()) {
        return handler(request);
    }
    if let Some(handler) = default_error_handler {
        return handler(request);
    }

    let mut response = Response::new();
    response.set_status(StatusCode::NotFound);
    response.html(default_not_found_page(server_name));
    response
}

fn should_keep_alive(config: &ServerConfig, request: &Request) -> bool {
    config.enable_keep_alive
        && request
            .header("connection")
            .map(|value| !value.eq_ignore_ascii_case("close"))
            .unwrap_or(true)
}

fn finalize_response(config: &ServerConfig, response: &mut Response, keep_alive: bool) {
    if !response.has_header("server") {
        response.set_header("Server", config.server_name.clone());
    }
    response.set_header("Date", httpdate_now());
    if keep_alive {
        response.set_header("Connection", "keep-alive");
        response.set_header(
            "Keep-Alive",
            format!("timeout={}", config.keep_alive_timeout),
        );
    } else {
        response.set_header("Connection", "close");
    }
}

fn default_not_found_page(server_name: &str) -> String {
    format!(
        "<html><head><title>404 Not Found</title></head><body><h1>404 Not Found</h1><hr><address>{server_name}</address></body></html>"
    )
}

/// Formats the current time as an RFC 1123 GMT timestamp, the format
/// `Date:` headers require, without pulling in a dedicated date crate.
fn httpdate_now() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_httpdate(now)
}

fn format_httpdate(secs_since_epoch: u64) -> String {
    const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    let days_since_epoch = secs_since_epoch / 86400;
    let secs_of_day = secs_since_epoch % 86400;
    let (hour, minute, second) = (secs_of_day / 3600, (secs_of_day / 60) % 60, secs_of_day % 60);

    let weekday = DAYS[((days_since_epoch + 4) % 7) as usize];
    let (year, month, day) = civil_from_days(days_since_epoch as i64);

    format!(
        "{weekday}, {day:02} {month} {year} {hour:02}:{minute:02}:{second:02} GMT",
        month = MONTHS[(month - 1) as usize],
    )
}

/// Howard Hinnant's `civil_from_days` algorithm: converts a day count
/// since the Unix epoch into a proleptic-Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

/// Reads one complete request (headers plus any declared body) from
/// `socket`. Returns `Ok(None)` on a clean peer close before any bytes
/// arrive.
async fn read_one_request(
    socket: &mut tokio::net::TcpStream,
    limits: &ParseLimits,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let header_end = memchr::memmem::find(&buffer, b"\r\n\r\n")
            .map(|pos| pos + 4)
            .or_else(|| memchr::memmem::find(&buffer, b"\n\n").map(|pos| pos + 2));

        if let Some(header_end) = header_end {
            let content_length = parse_content_length(&buffer[..header_end]);
            let needed = header_end + content_length.unwrap_or(0);
            if buffer.len() >= needed {
                return Ok(Some(buffer));
            }
        } else if buffer.len() > limits.max_header_size {
            return Ok(Some(buffer));
        }

        let read = socket.read(&mut chunk).await?;
        if read == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            return Ok(Some(buffer));
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
}

fn parse_content_length(head: &[u8]) -> Option<usize> {
    let head = std::str::from_utf8(head).ok()?;
    for line in head.split(['\r', '\n']) {
        if let Some(value) = line
            .split_once(':')
            .filter(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .map(|(_, value)| value.trim())
        {
            return value.parse().ok();
        }
    }
    None
}

/// Walks the connection table and wakes the servicing task of any
/// connection whose last activity is older than `timeout_seconds`.
/// Waking a task makes it shut down its own socket and return, which
/// is also where the table entry is pruned and `active_connections` is
/// decremented (see `run_reactor`'s `pool.enqueue_async` block) — the
/// sweeper never touches either itself, so a swept connection is only
/// ever counted closed once.
pub async fn run_sweeper(connections: ConnectionTable, timeout_seconds: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let now = Instant::now();
        let table = connections.lock().await;
        let expired: Vec<Arc<Notify>> = table
            .values()
            .filter(|meta| now.duration_since(meta.last_activity).as_secs() >= timeout_seconds)
            .map(|meta| meta.notify.clone())
            .collect();
        drop(table);

        for notify in expired {
            notify.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::server::router::Route;

    fn route(method: Method, template: &str) -> Route {
        Route::new(
            method,
            template,
            Box::new(|_req, res| {
                res.text("ok");
            }),
        )
    }

    #[test]
    fn not_found_without_handlers_uses_default_page() {
        let error_handlers = HashMap::new();
        let req = Request::parse(
            b"GET /missing HTTP/1.1\r\nHost: x\r\n\r\n",
            "127.0.0.1".to_string(),
            ParseLimits::default(),
        )
        .unwrap();

        let response = render_not_found(&error_handlers, &None, &req, "XKOJ/1.0");
        assert_eq!(response.status(), StatusCode::NotFound);
        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.contains("XKOJ/1.0"));
    }

    #[test]
    fn custom_404_handler_overrides_default_page() {
        let mut error_handlers: HashMap<u16, ErrorHandler> = HashMap::new();
        error_handlers.insert(
            404,
            Arc::new(|_req: &Request| {
                let mut response = Response::new();
                response.set_status(StatusCode::NotFound);
                response.json("{\"error\":\"not found\"}");
                response
            }),
        );

        let req = Request::parse(
            b"GET /missing HTTP/1.1\r\nHost: x\r\n\r\n",
            "127.0.0.1".to_string(),
            ParseLimits::default(),
        )
        .unwrap();

        let response = render_not_found(&error_handlers, &None, &req, "XKOJ/1.0");
        assert_eq!(response.body(), b"{\"error\":\"not found\"}");
    }

    #[test]
    fn method_mismatch_yields_405_with_allow_header() {
        let mut router = Router::new();
        router.add(route(Method::Post, "/a"));

        let mut req = Request::parse(
            b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n",
            "127.0.0.1".to_string(),
            ParseLimits::default(),
        )
        .unwrap();

        let outcome = router.dispatch_outcome(&mut req, Method::Get, "/a");
        let mut response = Response::new();
        dispatch_outcome(outcome, &req, &mut response, &[], &HashMap::new(), &None, "XKOJ/1.0");

        assert_eq!(response.status(), StatusCode::MethodNotAllowed);
        assert_eq!(response.get_header("Allow"), Some("POST"));
    }

    #[test]
    fn method_mismatch_falls_through_to_a_matching_static_file() {
        let dir = std::env::temp_dir().join(format!(
            "xkoj_web_test_method_mismatch_static_{:?}",
            std::thread::current().id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a"), b"file contents").unwrap();
        let mounts = vec![StaticMount::new("/", dir)];

        let mut router = Router::new();
        router.add(route(Method::Post, "/a"));

        let mut req = Request::parse(
            b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n",
            "127.0.0.1".to_string(),
            ParseLimits::default(),
        )
        .unwrap();

        let outcome = router.dispatch_outcome(&mut req, Method::Get, "/a");
        let mut response = Response::new();
        dispatch_outcome(outcome, &req, &mut response, &mounts, &HashMap::new(), &None, "XKOJ/1.0");

        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.body(), b"file contents");
    }

    #[tokio::test]
    async fn a_notified_connection_closes_its_socket_and_returns() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (server_socket, _) = listener.accept().await.unwrap();

        let notify = Arc::new(Notify::new());
        notify.notify_one();

        let connections: ConnectionTable = Arc::new(Mutex::new(HashMap::new()));
        let serving = tokio::spawn(serve_connection(
            server_socket,
            1,
            "127.0.0.1".to_string(),
            Arc::new(crate::config::ServerConfig::default()),
            Arc::new(Router::new()),
            Vec::new(),
            Arc::new(Vec::new()),
            Arc::new(HashMap::new()),
            None,
            connections,
            Arc::new(ServerStats::new()),
            notify,
        ));

        serving.await.expect("serve_connection task completes");

        let mut buf = [0u8; 1];
        let read = client.read(&mut buf).await.unwrap();
        assert_eq!(read, 0, "socket should have been shut down by the notified connection");
    }
}
