pub mod filter;
pub mod health;

// Re-export handler functions
pub use filter::*;
pub use health::*;
