//! Demo "online judge" front-end built on top of the `xkoj_web` core.
//!
//! Loads its configuration from the path given as the first CLI
//! argument (default `config/server.json`), installs the logger, wires
//! a handful of demo routes and a static mount, then runs until
//! `SIGINT`/`SIGTERM`.

use std::time::{SystemTime, UNIX_EPOCH};

use xkoj_web::{logging, Config, Method, Server, ServerConfig, StaticMount};

fn main() {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config/server.json".to_string());
    let config = Config::load(&config_path);

    init_logger(&config);
    log::info!("OJ System starting...");

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("failed to start the async runtime: {err}");
            std::process::exit(1);
        }
    };

    let exit_code = runtime.block_on(run(config));
    std::process::exit(exit_code);
}

async fn run(config: Config) -> i32 {
    let server_config = ServerConfig::from_config(&config);
    let public_path: String = config.get("server.public_path", "./public".to_string());
    let host = server_config.host.clone();
    let port = server_config.port;
    let health_host = host.clone();

    let builder = Server::builder(server_config)
        .middleware(logging())
        .static_mount(StaticMount::new("/static", public_path.clone()))
        .static_mount(StaticMount::new("/", public_path));

    let stats = builder.stats();

    let mut server = builder
        .route(Method::Get, "/", |_req, res| {
            res.html(dashboard_page());
        })
        .route(Method::Get, "/api/health", move |_req, res| {
            res.json(health_json(&health_host, port));
        })
        .route(Method::Get, "/api/status", move |_req, res| {
            res.json(stats.to_json());
        })
        .route(Method::Get, "/api/problems", |_req, res| {
            res.json(problems_json());
        })
        .route(Method::Get, "/api/docs", |_req, res| {
            res.html(docs_page());
        })
        .build();

    if let Err(err) = server.start().await {
        log::error!("failed to start HTTP server: {err}");
        return 1;
    }

    log::info!("OJ System started successfully");
    log::info!("Server listening on http://{host}:{port}");

    wait_for_shutdown().await;
    server.stop().await;
    log::info!("OJ System shutting down");
    0
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let Ok(mut terminate) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            let _ = ctrl_c.await;
            return;
        };
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

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn health_json(host: &str, port: u16) -> String {
    format!(
        "{{\"status\":\"ok\",\"message\":\"OJ System is running\",\"version\":\"1.0.0\",\"timestamp\":\"{}\",\"server\":{{\"host\":\"{}\",\"port\":{}}}}}",
        now_unix(),
        host,
        port,
    )
}

fn problems_json() -> &'static str {
    r#"{"problems":[{"id":1,"title":"Hello World","difficulty":"Easy","tags":["intro","output"],"accepted":1250,"submitted":1500},{"id":2,"title":"A+B Problem","difficulty":"Easy","tags":["math","intro"],"accepted":980,"submitted":1200},{"id":3,"title":"Sorting Algorithms","difficulty":"Medium","tags":["sorting","algorithms"],"accepted":450,"submitted":890}],"total":3}"#
}

fn dashboard_page() -> &'static str {
    r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>OJ System</title>
<style>
body { font-family: Arial, sans-serif; margin: 0; padding: 20px; background: #f5f5f5; }
.container { max-width: 1200px; margin: 0 auto; background: white; padding: 20px; border-radius: 8px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }
.header { text-align: center; margin-bottom: 30px; }
.nav { display: flex; justify-content: center; gap: 20px; margin-bottom: 30px; }
.nav a { text-decoration: none; color: #007bff; padding: 10px 20px; border: 1px solid #007bff; border-radius: 4px; }
.nav a:hover { background: #007bff; color: white; }
.status { background: #d4edda; padding: 15px; border-radius: 4px; margin-bottom: 20px; }
</style>
</head>
<body>
<div class="container">
<div class="header"><h1>OJ System</h1><p>Online judge front-end</p></div>
<div class="status"><strong>Status:</strong> running</div>
<div class="nav">
<a href="/api/health">Health</a>
<a href="/api/problems">Problems</a>
<a href="/api/status">Stats</a>
<a href="/api/docs">API docs</a>
</div>
</div>
</body>
</html>"#
}

fn docs_page() -> &'static str {
    r#"<!DOCTYPE html>
<html>
<head><title>API Documentation</title>
<style>
body { font-family: monospace; margin: 20px; }
.endpoint { margin: 20px 0; padding: 15px; border: 1px solid #ddd; }
.method { background: #007bff; color: white; padding: 2px 8px; border-radius: 3px; }
.path { font-weight: bold; }
</style>
</head>
<body>
<h1>API Documentation</h1>
<div class="endpoint"><div><span class="method">GET</span> <span class="path">/api/health</span></div><div>Health check</div></div>
<div class="endpoint"><div><span class="method">GET</span> <span class="path">/api/status</span></div><div>Live server statistics</div></div>
<div class="endpoint"><div><span class="method">GET</span> <span class="path">/api/problems</span></div><div>Sample problem list</div></div>
</body>
</html>"#
}

/// Installs `env_logger`, optionally teeing to a log file named by
/// `server.log_file`, at the level named by `server.log_level`.
fn init_logger(config: &Config) {
    let level_name: String = config.get("server.log_level", "INFO".to_string());
    let level = match level_name.to_uppercase().as_str() {
        "DEBUG" => log::LevelFilter::Debug,
        "WARN" => log::LevelFilter::Warn,
        "ERROR" | "FATAL" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };

    let log_file: String = config.get("server.log_file", "logs/server.log".to_string());
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);

    if let Some(parent) = std::path::Path::new(&log_file).parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match std::fs::OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        Err(err) => {
            eprintln!("could not open log file {log_file}: {err}; logging to stderr only");
        }
    }

    let _ = builder.try_init();
}
