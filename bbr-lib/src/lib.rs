mod constants;
mod count;
mod error;
mod globals;
mod handler;
mod log;
mod server;

use crate::{globals::Globals, handler::ExtProcHandlerBuilder, log::*, server::ExtProcServerBuilder};
use futures::future::select_all;
use std::sync::Arc;

pub use crate::{
  constants::{LATENCY_RESPONSE_HEADER, MODEL_ROUTING_HEADER},
  error::{BbrError, BbrResult},
  globals::ProcessorConfig,
};

/// Entrypoint that creates and spawns the ext_proc endpoint tasks
pub async fn entrypoint(
  processor_config: &ProcessorConfig,
  runtime_handle: &tokio::runtime::Handle,
  term_notify: Option<Arc<tokio::sync::Notify>>,
) -> BbrResult<()> {
  // For initial message logging
  if processor_config.listen_sockets.iter().any(|addr| addr.is_ipv6()) {
    info!("Listen both IPv4 and IPv6")
  } else {
    info!("Listen IPv4")
  }
  for addr in processor_config.listen_sockets.iter() {
    info!("Listen port: {}", addr.port());
  }
  if !processor_config.keepalive {
    info!("TCP keepalive is disabled");
  }

  // build global
  let globals = Arc::new(Globals {
    processor_config: processor_config.clone(),
    stream_count: Default::default(),
    runtime_handle: runtime_handle.clone(),
    term_notify: term_notify.clone(),
  });

  // build ext_proc message handler
  let handler = Arc::new(ExtProcHandlerBuilder::default().globals(globals.clone()).build()?);

  let addresses = globals.processor_config.listen_sockets.clone();
  let futures = select_all(addresses.into_iter().map(|addr| {
    let server = ExtProcServerBuilder::default()
      .globals(globals.clone())
      .listening_on(addr)
      .handler(handler.clone())
      .build()
      .unwrap();

    globals.runtime_handle.spawn(async move { server.start().await })
  }));

  // wait for all future
  if let (Ok(Err(e)), _, _) = futures.await {
    error!("Some ext_proc endpoints are down: {}", e);
  };

  Ok(())
}
