pub mod api;
pub mod config;
pub mod errors;
pub mod events;
pub mod github;
pub mod models;
pub mod pipeline;
pub mod planner;
pub mod server;
pub mod validate;
pub mod workspace;
