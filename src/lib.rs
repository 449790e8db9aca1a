pub mod config;
pub mod executor;
pub mod models;
pub mod protocol;
pub mod scheduler;
