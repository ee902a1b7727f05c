//! retrace-api: HTTP surface for the retrace observability and replay system

pub mod envelope;
pub mod middleware;
pub mod replay;
pub mod routes;
pub mod server;
pub mod state;

pub use server::{build_router, create_app_state, run, shutdown_signal};
pub use state::AppState;
