pub mod client;
pub mod config;
pub mod deploy;
pub mod error;
pub mod handler;
pub mod logging;
pub mod platform;
pub mod server;

pub use error::{Error, Result};
