pub mod cache_guard;
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod navigation;
pub mod server;
