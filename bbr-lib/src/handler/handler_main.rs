use super::context::RequestContext;
use crate::{
  constants::DIRECTIVE_CHANNEL_CAPACITY,
  error::{BbrError, BbrResult},
  globals::Globals,
  log::*,
};
use derive_builder::Builder;
use envoy_types::pb::envoy::service::ext_proc::v3::{
  external_processor_server::ExternalProcessor, processing_request::Request as ProcessingRequestVariant,
  ProcessingRequest, ProcessingResponse,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

/// ext_proc message handler.
/// Produces exactly one directive batch per incoming sub-message; the only
/// state carried across sub-messages of a stream is its RequestContext.
#[derive(Clone, Builder)]
pub struct ExtProcHandler {
  /// global context shared among streams
  pub globals: Arc<Globals>,
}

impl ExtProcHandler {
  /// Dispatch one sub-message to the entry point for its phase.
  /// Ordering across phases is trusted to the transport; the entry points
  /// share nothing but the context.
  pub fn process_message(&self, ctx: &mut RequestContext, msg: ProcessingRequest) -> BbrResult<Vec<ProcessingResponse>> {
    let request = msg.request.ok_or(BbrError::EmptyProcessingRequest)?;
    match request {
      ProcessingRequestVariant::RequestHeaders(v) => self.handle_request_headers(ctx, &v),
      ProcessingRequestVariant::RequestBody(v) => self.handle_request_body(ctx, &v),
      ProcessingRequestVariant::RequestTrailers(v) => self.handle_request_trailers(&v),
      ProcessingRequestVariant::ResponseHeaders(v) => self.handle_response_headers(&v, Some(ctx)),
      ProcessingRequestVariant::ResponseBody(v) => self.handle_response_body(&v),
      ProcessingRequestVariant::ResponseTrailers(v) => self.handle_response_trailers(&v),
    }
  }
}

#[tonic::async_trait]
impl ExternalProcessor for ExtProcHandler {
  type ProcessStream = ReceiverStream<Result<ProcessingResponse, Status>>;

  /// Serve one ext_proc stream, i.e. one HTTP transaction observed by the proxy.
  async fn process(&self, request: Request<Streaming<ProcessingRequest>>) -> Result<Response<Self::ProcessStream>, Status> {
    let stream_count = self.globals.stream_count.clone();
    if stream_count.increment() > self.globals.processor_config.max_clients {
      stream_count.decrement();
      return Err(Status::resource_exhausted("Too many in-flight transactions"));
    }
    trace!("Stream incoming: current # {}", stream_count.current());

    let mut in_stream = request.into_inner();
    let (tx, rx) = mpsc::channel(DIRECTIVE_CHANNEL_CAPACITY);
    let handler = self.clone();

    self.globals.runtime_handle.spawn(async move {
      let mut ctx = RequestContext::default();
      'receive: loop {
        match in_stream.message().await {
          Ok(Some(msg)) => match handler.process_message(&mut ctx, msg) {
            Ok(directives) => {
              for directive in directives {
                if tx.send(Ok(directive)).await.is_err() {
                  break 'receive;
                }
              }
            }
            Err(e) => {
              error!("Failed to process ext_proc message: {e}");
              let _ = tx.send(Err(e.into())).await;
              break 'receive;
            }
          },
          Ok(None) => break 'receive,
          Err(status) => {
            debug!("ext_proc stream closed by the proxy: {status}");
            break 'receive;
          }
        }
      }
      handler.globals.stream_count.decrement();
      trace!(
        "Stream done (model: {:?}): current # {}",
        ctx.model(),
        handler.globals.stream_count.current()
      );
    });

    Ok(Response::new(ReceiverStream::new(rx)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::globals::ProcessorConfig;
  use envoy_types::pb::envoy::service::ext_proc::v3::{
    processing_response::Response as DirectiveVariant, HttpBody, HttpHeaders, HttpTrailers,
  };

  fn build_handler() -> ExtProcHandler {
    let globals = Arc::new(Globals {
      processor_config: ProcessorConfig::default(),
      stream_count: Default::default(),
      runtime_handle: tokio::runtime::Handle::current(),
      term_notify: None,
    });
    ExtProcHandlerBuilder::default().globals(globals).build().unwrap()
  }

  fn sub_message(variant: ProcessingRequestVariant) -> ProcessingRequest {
    ProcessingRequest {
      request: Some(variant),
      ..Default::default()
    }
  }

  #[tokio::test]
  async fn variant_less_message_is_rejected() {
    let handler = build_handler();
    let mut ctx = RequestContext::default();
    let err = handler.process_message(&mut ctx, ProcessingRequest::default()).unwrap_err();
    assert!(matches!(err, BbrError::EmptyProcessingRequest));
  }

  #[tokio::test]
  async fn full_transaction_produces_one_directive_per_sub_message() {
    let handler = build_handler();
    let mut ctx = RequestContext::default();

    let sequence = vec![
      sub_message(ProcessingRequestVariant::RequestHeaders(HttpHeaders::default())),
      sub_message(ProcessingRequestVariant::RequestBody(HttpBody {
        body: br#"{"model":"llama"}"#.to_vec(),
        end_of_stream: true,
        ..Default::default()
      })),
      sub_message(ProcessingRequestVariant::RequestTrailers(HttpTrailers::default())),
      sub_message(ProcessingRequestVariant::ResponseHeaders(HttpHeaders::default())),
      sub_message(ProcessingRequestVariant::ResponseBody(HttpBody::default())),
      sub_message(ProcessingRequestVariant::ResponseTrailers(HttpTrailers::default())),
    ];

    let mut directives = Vec::new();
    for msg in sequence {
      let batch = handler.process_message(&mut ctx, msg).unwrap();
      assert_eq!(batch.len(), 1);
      directives.extend(batch);
    }

    assert!(matches!(
      directives[0].response,
      Some(DirectiveVariant::RequestHeaders(_))
    ));
    assert!(matches!(directives[1].response, Some(DirectiveVariant::RequestBody(_))));
    assert!(matches!(
      directives[2].response,
      Some(DirectiveVariant::RequestTrailers(_))
    ));
    assert!(matches!(
      directives[3].response,
      Some(DirectiveVariant::ResponseHeaders(_))
    ));
    assert!(matches!(directives[4].response, Some(DirectiveVariant::ResponseBody(_))));
    assert!(matches!(
      directives[5].response,
      Some(DirectiveVariant::ResponseTrailers(_))
    ));

    // the response-headers directive carries the latency annotation since the
    // request leg was seen first
    let Some(DirectiveVariant::ResponseHeaders(headers_response)) = &directives[3].response else {
      unreachable!();
    };
    let mutation = headers_response
      .response
      .as_ref()
      .unwrap()
      .header_mutation
      .as_ref()
      .unwrap();
    assert_eq!(mutation.set_headers.len(), 1);
  }
}
