pub mod authorization;
pub mod cli;
pub mod configuration;
pub mod core;
pub mod discovery;
pub mod endpoints;
pub mod logger;
pub mod session;
pub mod token_store;
pub mod transport;
