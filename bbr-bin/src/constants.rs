pub const LISTEN_ADDRESSES_V4: &[&str] = &["0.0.0.0"];
pub const LISTEN_ADDRESSES_V6: &[&str] = &["[::]"];
/// Default grpc port for the ext_proc endpoint
pub const DEFAULT_LISTEN_PORT: u16 = 9004;
pub const CONFIG_WATCH_DELAY_SECS: u32 = 15;
