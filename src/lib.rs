pub mod checkpoints;
pub mod commands;
pub mod config;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod store;
