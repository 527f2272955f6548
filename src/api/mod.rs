pub mod routes;

// Re-export route handlers for convenience
pub use routes::alerts;
pub use routes::state::AppState;
pub use routes::triggers;
