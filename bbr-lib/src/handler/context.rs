use bytes::{BufMut, Bytes, BytesMut};
use std::time::Instant;

/// Per-transaction context threaded between the request and response legs of a
/// single ext_proc stream. Exclusively owned by the stream's dispatch task,
/// created when the stream starts and dropped when it ends.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
  /// The moment the request leg first observed this transaction.
  /// Written once by the request leg; the response leg only reads it.
  request_received_at: Option<Instant>,
  /// Model name extracted from the request body, if any
  model: Option<String>,
  /// Request body chunks accumulated until the final one arrives
  body_buffer: BytesMut,
}

impl RequestContext {
  /// Record the arrival of the request leg. First write wins.
  pub fn mark_request_received(&mut self) {
    if self.request_received_at.is_none() {
      self.request_received_at = Some(Instant::now());
    }
  }

  pub fn request_received_at(&self) -> Option<Instant> {
    self.request_received_at
  }

  pub fn model(&self) -> Option<&str> {
    self.model.as_deref()
  }

  pub(super) fn set_model(&mut self, model: &str) {
    self.model = Some(model.to_string());
  }

  pub(super) fn push_body_chunk(&mut self, chunk: &[u8]) {
    self.body_buffer.put_slice(chunk);
  }

  /// Take the accumulated request body out of the context for parsing
  pub(super) fn take_body(&mut self) -> Bytes {
    self.body_buffer.split().freeze()
  }

  #[cfg(test)]
  pub(crate) fn set_request_received_at(&mut self, at: Instant) {
    self.request_received_at = Some(at);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn request_received_at_is_written_once() {
    let mut ctx = RequestContext::default();
    assert!(ctx.request_received_at().is_none());
    ctx.mark_request_received();
    let first = ctx.request_received_at().unwrap();
    ctx.mark_request_received();
    assert_eq!(ctx.request_received_at().unwrap(), first);
  }

  #[test]
  fn body_buffer_accumulates_and_drains() {
    let mut ctx = RequestContext::default();
    ctx.push_body_chunk(br#"{"model":"#);
    ctx.push_body_chunk(br#""llama"}"#);
    assert_eq!(ctx.take_body().as_ref(), br#"{"model":"llama"}"#);
    assert!(ctx.take_body().is_empty());
  }
}
