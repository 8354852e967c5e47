//! shockwave - High-performance HTTP/1.1 serving engine for microservices
//!
//! A performance-oriented HTTP server with comprehensive configuration
//! for memory management, connection handling, routing, middleware, and
//! JWT-based authentication. Designed for services requiring fine-grained
//! control over resources without pulling in a full web framework.
//!
//! # Protocol Support
//!
//! - **HTTP/1.1**: Full protocol with persistent connections and chunked encoding
//! - **HTTP/1.0**: Basic protocol support for legacy clients and simple requests
//!
//! # Features
//!
//! ## 🔒 Security & Protection
//! - **Built-in DoS/DDoS protection** - enabled by default, with no performance penalty.
//! - **Fully configurable limits and timeouts** for requests, responses, and connections.
//! - **Custom connection filtering** - implement the [`ConnectionFilter`] trait to
//!   reject unwanted connections at the TCP level.
//! - **JWT authentication** - [`auth::JwtValidator`] validates and caches bearer
//!   tokens with a bounded TTL cache.
//!
//! ## 🚀 Performance & Memory
//! - **Zero-allocation hot path** - no memory allocations after server startup for
//!   requests whose body fits the configured inline threshold.
//! - **Pre-allocated memory for each connection** - linear and transparent scaling.
//! - **Radix-tree routing** - [`Router`] dispatches on static, `:param`, and
//!   `*wildcard` segments with O(segment count) lookup.
//!
//! ## 🌐 Protocol & Management
//! - **Full HTTP stack** - `HTTP/1.1` with `HTTP/1.0` fallback, chunked
//!   transfer-encoding, and keep-alive.
//! - **Automatic protocol detection for each request** - keep-alive eliminates
//!   the need for manual protocol selection.
//! - **Storing data between requests** - ability to store data between requests in a
//!   single connection using the [`ConnectionData`] trait.
//! - **Typed JSON responses** - [`envelope::Data`] wraps handler output in a
//!   consistent success/error envelope.
//!
//! ## 🏭 Production Ready
//! - **Graceful performance degradation** - automatic 503 responses when overloaded.
//! - [**Custom error format**
//!   ](https://docs.rs/shockwave/latest/shockwave/limits/struct.ServerLimits.html#structfield.json_errors) -
//!   structured JSON (with codes/descriptions) or a plain HTTP response.
//! - **Resource protection** - automatic closure of connections exceeding set limits.
//! - **Graceful shutdown** - [`ServerBuilder::shutdown`] races the accept loop
//!   against a caller-supplied future.
//!
//! # Quick Start
//!
//! ```no_run
//! use shockwave::{Server, Handler, Request, Response, Handled, StatusCode};
//! use tokio::net::TcpListener;
//!
//! struct MyHandler;
//!
//! impl Handler for MyHandler {
//!     async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response) -> Handled {
//!         resp.status(StatusCode::Ok).body("Hello World!")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .handler(MyHandler)
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```
//!
//! # Use Cases
//!
//! - **High-throughput microservices** - configurable for specific workloads
//! - **Resource-constrained environments** - predictable memory usage
//! - **Internal APIs** - security-conscious defaults, JWT auth built in
//! - **Performance-critical applications** - zero-allocation hot path
pub(crate) mod http {
    pub mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod server_impl;
    pub(crate) mod socket_tuner;
}
pub(crate) mod errors;
pub mod limits;
pub mod router;
pub mod middleware;
pub mod envelope;
pub mod context;
pub mod auth;

pub use crate::{
    http::{
        query,
        request::Request,
        response::{
            write::{BodyWriter, WriteBuffer},
            Handled, Response,
        },
        types::{Method, StatusCode, Url, Version},
    },
    server::{
        connection::{ConnectionData, ConnectionFilter},
        server_impl::{Handler, Server, ServerBuilder, ServerStats},
        socket_tuner::SocketProfile,
    },
};

pub use crate::{
    auth::{AuthError, JwtClaims, JwtConfig, JwtValidator},
    context::{Context, ContextPool},
    envelope::Data,
    middleware::{Middleware, MiddlewareStack, Next},
    router::{RouteConflict, Router},
};

#[doc(hidden)]
pub fn run_test<F: FnOnce(&Request, &mut Response) -> Handled>(f: F) {
    f(
        &Request::new(&crate::limits::ReqLimits::default()),
        &mut Response::new(&crate::limits::RespLimits::default()),
    );
}

#[doc(hidden)]
#[macro_export]
macro_rules! impt_default_handler {
    ($name:ident) => {
        use shockwave::{Handled, Handler, Request, Response, StatusCode};
        struct $name;

        // `<()>` to check functionality
        impl Handler<()> for $name {
            async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response) -> Handled {
                resp.status(StatusCode::Ok).body("Hello world!")
            }
        }
    };
}
