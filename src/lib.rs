// Library root for Sentinel Trust

pub mod audit;
pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod engine;
pub mod loader;
pub mod state;
