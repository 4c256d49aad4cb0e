pub mod config;
pub mod logging;

pub mod backend;
pub mod batch;
pub mod error;
pub mod gateway;
pub mod retry;
pub mod season;
pub mod server;
pub mod stream;

pub use error::{ProxyError, ProxyErrorCode};
