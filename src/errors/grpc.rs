use tonic::Status;
use tracing::error;

use super::{is_transient_db_error, ServiceError};

/// Extension trait for converting ServiceError to gRPC Status with proper codes
pub trait IntoGrpcStatus {
    fn into_grpc_status(self) -> Status;
}

impl IntoGrpcStatus for ServiceError {
    fn into_grpc_status(self) -> Status {
        match self {
            ServiceError::NotFound(msg) => Status::not_found(msg),
            ServiceError::ValidationError(msg)
            | ServiceError::InvalidStatus(msg)
            | ServiceError::InvalidInput(msg) => Status::invalid_argument(msg),
            ServiceError::FailedPrecondition(msg) => Status::failed_precondition(msg),
            ServiceError::InvalidTransition { from, to } => Status::failed_precondition(format!(
                "Transition from {} to {} is not allowed",
                from, to
            )),
            ServiceError::DeadlineExceeded => Status::deadline_exceeded("Deadline exceeded"),
            ServiceError::ServiceUnavailable(msg) => Status::unavailable(msg),
            ServiceError::ExternalServiceError(msg) => {
                error!("External service error: {}", msg);
                Status::unavailable(format!("External service unavailable: {}", msg))
            }
            ServiceError::DatabaseError(err) if is_transient_db_error(&err) => {
                error!("Transient database error: {}", err);
                Status::unavailable("Database temporarily unavailable")
            }
            ServiceError::DatabaseError(err) => {
                error!("Database error: {}", err);
                Status::internal("Database operation failed")
            }
            ServiceError::Unauthorized(msg) => Status::unauthenticated(msg),
            ServiceError::InternalError(msg) => {
                error!("Internal error: {}", msg);
                Status::internal("Internal server error")
            }
            ServiceError::Other(err) => {
                error!("Other error: {}", err);
                Status::internal("An unexpected error occurred")
            }
        }
    }
}

/// Helper function to map Result<T, ServiceError> to Result<T, Status>
pub fn map_service_error<T>(result: Result<T, ServiceError>) -> Result<T, Status> {
    result.map_err(|e| e.into_grpc_status())
}
