mod context;
mod handler_main;
mod request;
mod response;

pub use {
  context::RequestContext,
  handler_main::{ExtProcHandler, ExtProcHandlerBuilder, ExtProcHandlerBuilderError},
};
