use super::{context::RequestContext, ExtProcHandler};
use crate::{
  constants::{MODEL_BODY_FIELD, MODEL_ROUTING_HEADER},
  error::BbrResult,
  log::*,
};
use envoy_types::pb::envoy::{
  config::core::v3::{HeaderValue, HeaderValueOption},
  service::ext_proc::v3::{
    processing_response::Response, BodyResponse, CommonResponse, HeaderMutation, HeadersResponse, HttpBody,
    HttpHeaders, HttpTrailers, ProcessingResponse, TrailersResponse,
  },
};

impl ExtProcHandler {
  /// Handle request headers. Records the arrival of the transaction; the
  /// routing decision is deferred until the body has been seen.
  pub fn handle_request_headers(
    &self,
    ctx: &mut RequestContext,
    _headers: &HttpHeaders,
  ) -> BbrResult<Vec<ProcessingResponse>> {
    ctx.mark_request_received();
    Ok(vec![ProcessingResponse {
      response: Some(Response::RequestHeaders(HeadersResponse::default())),
      ..Default::default()
    }])
  }

  /// Handle request body chunks. Chunks accumulate in the context until the
  /// final one; the buffered document is then inspected for the model field
  /// and, when present, the routing header is set and the route cache cleared
  /// so the proxy re-evaluates route selection with it.
  pub fn handle_request_body(&self, ctx: &mut RequestContext, body: &HttpBody) -> BbrResult<Vec<ProcessingResponse>> {
    ctx.push_body_chunk(&body.body);
    if !body.end_of_stream {
      return Ok(vec![passthrough_body_response()]);
    }

    let buffered = ctx.take_body();
    if buffered.is_empty() {
      return Ok(vec![passthrough_body_response()]);
    }

    let document: serde_json::Value = serde_json::from_slice(&buffered)?;
    let Some(model) = document.get(MODEL_BODY_FIELD).and_then(|v| v.as_str()) else {
      debug!("No {MODEL_BODY_FIELD} field in request body");
      return Ok(vec![passthrough_body_response()]);
    };
    ctx.set_model(model);
    debug!("Request routed by body: {MODEL_ROUTING_HEADER} = {model}");

    Ok(vec![ProcessingResponse {
      response: Some(Response::RequestBody(BodyResponse {
        response: Some(CommonResponse {
          header_mutation: Some(HeaderMutation {
            set_headers: vec![HeaderValueOption {
              header: Some(HeaderValue {
                key: MODEL_ROUTING_HEADER.to_string(),
                raw_value: model.as_bytes().to_vec(),
                ..Default::default()
              }),
              ..Default::default()
            }],
            ..Default::default()
          }),
          // route must be recomputed with the injected header
          clear_route_cache: true,
          ..Default::default()
        }),
      })),
      ..Default::default()
    }])
  }

  /// Handle request trailers. Pass-through.
  pub fn handle_request_trailers(&self, _trailers: &HttpTrailers) -> BbrResult<Vec<ProcessingResponse>> {
    Ok(vec![ProcessingResponse {
      response: Some(Response::RequestTrailers(TrailersResponse::default())),
      ..Default::default()
    }])
  }
}

fn passthrough_body_response() -> ProcessingResponse {
  ProcessingResponse {
    response: Some(Response::RequestBody(BodyResponse::default())),
    ..Default::default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    error::BbrError,
    globals::{Globals, ProcessorConfig},
    handler::ExtProcHandlerBuilder,
  };
  use std::sync::Arc;

  fn build_handler() -> ExtProcHandler {
    let globals = Arc::new(Globals {
      processor_config: ProcessorConfig::default(),
      stream_count: Default::default(),
      runtime_handle: tokio::runtime::Handle::current(),
      term_notify: None,
    });
    ExtProcHandlerBuilder::default().globals(globals).build().unwrap()
  }

  fn final_chunk(body: &[u8]) -> HttpBody {
    HttpBody {
      body: body.to_vec(),
      end_of_stream: true,
      ..Default::default()
    }
  }

  fn routing_header_of(response: &ProcessingResponse) -> Option<(String, Vec<u8>, bool)> {
    let Some(Response::RequestBody(body_response)) = &response.response else {
      panic!("not a request-body directive");
    };
    let common = body_response.response.as_ref()?;
    let header = common.header_mutation.as_ref()?.set_headers.first()?.header.as_ref()?;
    Some((header.key.clone(), header.raw_value.clone(), common.clear_route_cache))
  }

  #[tokio::test]
  async fn request_headers_record_arrival_and_pass_through() {
    let handler = build_handler();
    let mut ctx = RequestContext::default();
    let responses = handler.handle_request_headers(&mut ctx, &HttpHeaders::default()).unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(
      responses[0].response,
      Some(Response::RequestHeaders(HeadersResponse::default()))
    );
    assert!(ctx.request_received_at().is_some());
  }

  #[tokio::test]
  async fn model_in_buffered_body_sets_routing_header() {
    let handler = build_handler();
    let mut ctx = RequestContext::default();
    let responses = handler
      .handle_request_body(&mut ctx, &final_chunk(br#"{"model":"llama-70b","prompt":"hi"}"#))
      .unwrap();
    assert_eq!(responses.len(), 1);

    let (key, value, clear_route_cache) = routing_header_of(&responses[0]).unwrap();
    assert_eq!(key, MODEL_ROUTING_HEADER);
    assert_eq!(value, b"llama-70b");
    assert!(clear_route_cache);
    assert_eq!(ctx.model(), Some("llama-70b"));
  }

  #[tokio::test]
  async fn streamed_chunks_accumulate_until_end_of_stream() {
    let handler = build_handler();
    let mut ctx = RequestContext::default();

    let first = handler
      .handle_request_body(
        &mut ctx,
        &HttpBody {
          body: br#"{"model":"mi"#.to_vec(),
          ..Default::default()
        },
      )
      .unwrap();
    assert_eq!(first.len(), 1);
    assert!(routing_header_of(&first[0]).is_none());

    let last = handler
      .handle_request_body(&mut ctx, &final_chunk(br#"stral"}"#))
      .unwrap();
    let (_, value, _) = routing_header_of(&last[0]).unwrap();
    assert_eq!(value, b"mistral");
  }

  #[tokio::test]
  async fn body_without_model_passes_through() {
    let handler = build_handler();
    let mut ctx = RequestContext::default();
    let responses = handler
      .handle_request_body(&mut ctx, &final_chunk(br#"{"prompt":"hi"}"#))
      .unwrap();
    assert!(routing_header_of(&responses[0]).is_none());
    assert!(ctx.model().is_none());
  }

  #[tokio::test]
  async fn empty_body_passes_through() {
    let handler = build_handler();
    let mut ctx = RequestContext::default();
    let responses = handler.handle_request_body(&mut ctx, &final_chunk(b"")).unwrap();
    assert!(routing_header_of(&responses[0]).is_none());
  }

  #[tokio::test]
  async fn malformed_body_is_surfaced_as_error() {
    let handler = build_handler();
    let mut ctx = RequestContext::default();
    let err = handler
      .handle_request_body(&mut ctx, &final_chunk(b"model=llama"))
      .unwrap_err();
    assert!(matches!(err, BbrError::ParseRequestBody(_)));
  }
}
