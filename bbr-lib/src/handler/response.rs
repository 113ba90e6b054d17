use super::{context::RequestContext, ExtProcHandler};
use crate::{constants::LATENCY_RESPONSE_HEADER, error::BbrResult};
use envoy_types::pb::envoy::{
  config::core::v3::{HeaderValue, HeaderValueOption},
  service::ext_proc::v3::{
    processing_response::Response, BodyResponse, CommonResponse, HeaderMutation, HeadersResponse, HttpBody,
    HttpHeaders, HttpTrailers, ProcessingResponse, TrailersResponse,
  },
};

impl ExtProcHandler {
  /// Handle response headers. The incoming header values are unused but kept in
  /// the signature for protocol symmetry; the directive annotates the outgoing
  /// headers with the latency measured against the transaction context.
  pub fn handle_response_headers(
    &self,
    _headers: &HttpHeaders,
    ctx: Option<&RequestContext>,
  ) -> BbrResult<Vec<ProcessingResponse>> {
    Ok(vec![ProcessingResponse {
      response: Some(Response::ResponseHeaders(HeadersResponse {
        response: Some(CommonResponse {
          header_mutation: Some(HeaderMutation {
            set_headers: generate_response_headers(ctx),
            ..Default::default()
          }),
          ..Default::default()
        }),
      })),
      ..Default::default()
    }])
  }

  /// Handle response body chunks. Pass-through, one directive per chunk.
  pub fn handle_response_body(&self, _body: &HttpBody) -> BbrResult<Vec<ProcessingResponse>> {
    Ok(vec![ProcessingResponse {
      response: Some(Response::ResponseBody(BodyResponse::default())),
      ..Default::default()
    }])
  }

  /// Handle response trailers. Pass-through.
  pub fn handle_response_trailers(&self, _trailers: &HttpTrailers) -> BbrResult<Vec<ProcessingResponse>> {
    Ok(vec![ProcessingResponse {
      response: Some(Response::ResponseTrailers(TrailersResponse::default())),
      ..Default::default()
    }])
  }
}

/// Build the set-headers list for the response leg. Empty unless the request
/// leg recorded its arrival; otherwise a single latency entry holding the
/// elapsed whole milliseconds as a decimal string.
fn generate_response_headers(ctx: Option<&RequestContext>) -> Vec<HeaderValueOption> {
  let mut headers = Vec::new();

  if let Some(received_at) = ctx.and_then(|c| c.request_received_at()) {
    let latency_ms = received_at.elapsed().as_millis() as i64;
    headers.push(HeaderValueOption {
      header: Some(HeaderValue {
        key: LATENCY_RESPONSE_HEADER.to_string(),
        raw_value: latency_ms.to_string().into_bytes(),
        ..Default::default()
      }),
      ..Default::default()
    });
  }

  headers
}
