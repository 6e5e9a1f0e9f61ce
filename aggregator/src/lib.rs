pub mod api;
pub mod config;
pub mod consumer;
pub mod event;
pub mod gateway;
pub mod handlers;
pub mod pipeline;
pub mod prometheus;
pub mod queue;
pub mod router;
pub mod server;
pub mod stats;
pub mod store;
pub mod time;
