/// Response header annotating the processing latency attributable to this service.
/// Fixed wire-level constant; downstream consumers parse it byte-for-byte.
pub const LATENCY_RESPONSE_HEADER: &str = "x-bbr-latency-ms";

/// Request header carrying the model name extracted from the request body,
/// consumed by the proxy's routing layer
pub const MODEL_ROUTING_HEADER: &str = "x-gateway-model-name";

/// Field looked up in the JSON request body to pick the model
pub const MODEL_BODY_FIELD: &str = "model";

pub const MAX_CLIENTS: usize = 512;
pub const MAX_CONCURRENT_STREAMS: u32 = 64;
pub const TCP_KEEPALIVE_SEC: u64 = 20;

/// Capacity of the per-stream channel buffering directives towards the proxy
pub const DIRECTIVE_CHANNEL_CAPACITY: usize = 16;
