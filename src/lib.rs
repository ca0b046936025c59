//! # waypoint
//!
//! An embeddable async HTTP request-dispatch layer: ordered regex routes with an
//! explicit continue/stop protocol, an error chain, a two-phase response that
//! commits its head exactly once, and range-aware static content.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use waypoint::router::{Flow, Router};
//! use waypoint::server::Server;
//! use waypoint::static_content::StaticDirectory;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.allow_cors(&["/api/.*"])?;
//!     router.get(r"/api/hello/(\w+)", |caps, _req, res| {
//!         Box::pin(async move {
//!             res.write_body_text(&format!("Hello, {}!", &caps[0])).await?;
//!             Ok(Flow::Stop)
//!         })
//!     })?;
//!     router.static_directory("/", StaticDirectory::new("./public").default_file("index.html"))?;
//!
//!     Server::bind("127.0.0.1:8080").await?.run(router).await?;
//!     Ok(())
//! }
//! ```
//!
//! The [`server`] module is a reference host; any transport can drive a
//! [`Router`] through [`Router::serve`] with its own
//! [`ResponseSink`](http::ResponseSink).

pub mod error;
pub mod http;
pub mod router;
pub mod security;
pub mod server;
pub mod static_content;

pub use error::{Error, ErrorKind};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::{Flow, HandlerResult, Router};
pub use server::{Server, ServerError};
