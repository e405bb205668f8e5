mod server;

pub use server::{LogFormat, LoggingConfig, ServerConfig};
