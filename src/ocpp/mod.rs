pub mod dispatcher;
pub mod handlers;
pub mod payloads;
pub mod validator;

pub use dispatcher::{CallFault, DataTransferExtensions, OcppContext, OcppHandler};
pub use validator::{validate_request, validate_response, ValidationFailure};
