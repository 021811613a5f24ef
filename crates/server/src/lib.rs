pub mod api;
pub mod config;
pub mod range;
pub mod state;
pub mod streaming;
pub mod utils;
