pub mod checkout_webhooks;
pub mod health;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
