//! CBIR Server - HTTP query front end for image similarity search
//!
//! Loads a set of index shards at start-up and answers image queries
//! against them.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! - `GET /` - API information
//! - `GET /health` - Liveness and loaded shards
//! - `GET /ciq?url=..&lc=..&le=..` - Fetch an image and query with it
//! - `POST /ciq?lc=..&le=..` - Query with the raw request body
//!
//! `lc` is the coefficient threshold and `le` the channel-average threshold;
//! both default to 0.4. Query responses are JSON arrays of matches, best
//! first, capped at `result_limit`. A failed query answers `[]`.
//!
//! # Configuration
//!
//! `server.{toml,yaml,json}` in the working directory, overridden by
//! `CBIR_SERVER__*` environment variables (`.env` is honoured), e.g.
//! `CBIR_SERVER__SHARDS=out-0.hsm,out-1.hsm` and `CBIR_SERVER__DISK_PAGED=true`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
