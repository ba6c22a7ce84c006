//! xkoj_web — an embeddable HTTP/1.1 server core for small services.
//!
//! The crate is organized around three coupled subsystems:
//!
//! - a non-blocking connection reactor (the `tokio` accept loop, worker
//!   pool, and idle-connection sweeper in [`server`]),
//! - an HTTP/1.1 wire codec (request parsing and response serialization
//!   in [`http`]),
//! - a route table and middleware chain (pattern-based path matching
//!   and short-circuiting interceptors in [`server`]).
//!
//! # Quick start
//!
//! ```no_run
//! use xkoj_web::{Config, Method, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = ServerConfig::from_config(&Config::load("config/server.json"));
//!     let mut server = Server::builder(config)
//!         .route(Method::Get, "/", |_req, res| {
//!             res.text("hello");
//!         })
//!         .build();
//!
//!     server.start().await?;
//!     server.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! Configuration loading, logging, and the demo route handlers are
//! deliberately thin; the design effort in this crate is the reactor,
//! the codec, and the routing/middleware pipeline.

pub mod http {
    pub(crate) mod cookie;
    pub(crate) mod multipart;
    pub(crate) mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;

    pub use cookie::Cookie;
    pub use multipart::UploadedFile;
    pub use request::{ParseLimits, Request};
    pub use response::Response;
    pub use types::{Method, StatusCode, Version};
}

pub mod server {
    pub(crate) mod connection;
    pub(crate) mod middleware;
    pub(crate) mod router;
    #[allow(clippy::module_inception)]
    pub(crate) mod server;
    pub(crate) mod static_file;
    pub(crate) mod stats;
    pub(crate) mod worker;

    pub use middleware::{auth, cors, logging, rate_limit, CorsConfig, Middleware};
    pub use router::Route;
    pub use server::{ErrorHandler, Server, ServerBuilder};
    pub use stats::ServerStats;
    pub use static_file::StaticMount;
}

pub mod config;
pub mod errors;

pub use crate::{
    config::{Config, ServerConfig},
    errors::ErrorKind,
    http::{Cookie, Method, ParseLimits, Request, Response, StatusCode, UploadedFile, Version},
    server::{auth, cors, logging, rate_limit, CorsConfig, ErrorHandler, Middleware, Route, Server, ServerBuilder, ServerStats, StaticMount},
};
