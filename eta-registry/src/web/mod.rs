//! Thin JSON read surface over the registry.
//!
//! Presentation proper lives elsewhere; this layer only exposes the
//! registry's read operations and favourite accessors.

mod dto;
mod routes;
mod state;

pub use dto::AppError;
pub use routes::create_router;
pub use state::AppState;
