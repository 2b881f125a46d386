pub mod collect;
pub mod health;

// Re-export command functions for convenience
pub use collect::collect;
pub use health::{accounts, health};
