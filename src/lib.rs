pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod server;
pub mod source;
