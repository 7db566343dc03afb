//! tally-api - LAN endpoint for device pairing and sync
//!
//! Hosts the small HTTP surface a remote Tally device talks to
//! (`POST /pair`, `POST /sync`, `GET /ping`, `GET /status`) and the
//! server lifecycle around it: bind, auto-close at session expiry, and
//! graceful shutdown.

pub mod error;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::{app_router, AppState};
pub use server::SyncServer;
