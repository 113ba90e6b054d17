use crate::{
  constants::TCP_KEEPALIVE_SEC,
  error::BbrResult,
  globals::Globals,
  handler::ExtProcHandler,
  log::*,
};
use derive_builder::Builder;
use envoy_types::pb::envoy::service::ext_proc::v3::external_processor_server::ExternalProcessorServer;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tonic::transport::Server;

#[derive(Clone, Builder)]
/// grpc endpoint object responsible to serve ext_proc streams received from the
/// proxy at the given socket address, along with standard grpc health checking.
pub(crate) struct ExtProcServer {
  /// global context shared among async tasks
  pub globals: Arc<Globals>,
  /// listen socket address
  pub listening_on: SocketAddr,
  /// message handler serving incoming ext_proc streams
  pub handler: Arc<ExtProcHandler>,
}

impl ExtProcServer {
  /// Start serving the ext_proc and health endpoints
  pub async fn start(&self) -> BbrResult<()> {
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
      .set_serving::<ExternalProcessorServer<ExtProcHandler>>()
      .await;

    let keepalive = self
      .globals
      .processor_config
      .keepalive
      .then(|| Duration::from_secs(TCP_KEEPALIVE_SEC));

    let server = Server::builder()
      .tcp_keepalive(keepalive)
      .max_concurrent_streams(Some(self.globals.processor_config.max_concurrent_streams))
      .add_service(health_service)
      .add_service(ExternalProcessorServer::from_arc(self.handler.clone()));

    info!("Start ext_proc endpoint serving with: {}", self.listening_on);

    match &self.globals.term_notify {
      Some(term) => {
        server.serve_with_shutdown(self.listening_on, term.notified()).await?;
        info!("ext_proc endpoint on {} stopped for config update", self.listening_on);
      }
      None => {
        server.serve(self.listening_on).await?;
      }
    }

    Ok(())
  }
}
