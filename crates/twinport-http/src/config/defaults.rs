//! Default configuration values

pub struct ServerDefaults;

impl ServerDefaults {
    pub const HOST: &'static str = "0.0.0.0";
    pub const PORT: u16 = 8009;
    pub const MAX_HEADER_SIZE: usize = 64 * 1024; // 64KB
    pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024; // 16MB
    pub const WS_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024; // 64MB
    pub const WS_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB
    pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;
}
