// Shared library for the Reddit monitor: models, capabilities, runner and scheduler

pub mod bootstrap;
pub mod config;
pub mod config_store;
pub mod credentials;
pub mod dedup;
pub mod errors;
pub mod filter;
pub mod models;
pub mod notifier;
pub mod reddit;
pub mod runner;
pub mod scheduler;
pub mod telemetry;
