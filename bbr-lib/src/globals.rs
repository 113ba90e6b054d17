use crate::{constants::*, count::StreamCount};
use std::{net::SocketAddr, sync::Arc};

/// Global object containing the processor configuration and shared objects like counters.
/// But note that in Globals, we do not have Mutex and RwLock. It is indeed, the context shared among async tasks.
pub struct Globals {
  /// Configuration parameters for the grpc endpoint and processing handlers
  pub processor_config: ProcessorConfig,

  /// Shared context - Counter for in-flight ext_proc streams
  pub stream_count: StreamCount,

  /// Shared context - Async task runtime handler
  pub runtime_handle: tokio::runtime::Handle,

  /// Shared context - Notify object to terminate serving tasks
  pub term_notify: Option<Arc<tokio::sync::Notify>>,
}

/// Configuration parameters for the grpc endpoint and processing handlers
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ProcessorConfig {
  pub listen_sockets: Vec<SocketAddr>, // when instantiate server
  pub max_clients: usize,              // when accepting streams
  pub max_concurrent_streams: u32,     // when instantiate server
  pub keepalive: bool,                 // when instantiate server
}

impl Default for ProcessorConfig {
  fn default() -> Self {
    Self {
      listen_sockets: Vec::new(),
      max_clients: MAX_CLIENTS,
      max_concurrent_streams: MAX_CONCURRENT_STREAMS,
      keepalive: true,
    }
  }
}
