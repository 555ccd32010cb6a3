pub mod config;
pub mod file_sink;

pub use config::{init_logging, log_shutdown_info, log_startup_info, LoggingConfig};
pub use file_sink::FileLog;
