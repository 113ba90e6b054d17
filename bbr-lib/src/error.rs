use thiserror::Error;

pub type BbrResult<T> = std::result::Result<T, BbrError>;

/// Describes things that can go wrong in the bbr external processor
#[derive(Debug, Error)]
pub enum BbrError {
  // grpc endpoint errors
  #[error("Failed to serve grpc endpoint: {0}")]
  GrpcServe(#[from] tonic::transport::Error),

  // processing stream errors
  #[error("ProcessingRequest carries no sub-message")]
  EmptyProcessingRequest,
  #[error("Failed to parse request body: {0}")]
  ParseRequestBody(#[from] serde_json::Error),

  // Handler errors
  #[error("Failed to build ext_proc handler: {0}")]
  HandlerBuild(#[from] crate::handler::ExtProcHandlerBuilderError),
}

impl From<BbrError> for tonic::Status {
  fn from(e: BbrError) -> Self {
    match e {
      BbrError::EmptyProcessingRequest | BbrError::ParseRequestBody(_) => tonic::Status::invalid_argument(e.to_string()),
      _ => tonic::Status::internal(e.to_string()),
    }
  }
}
