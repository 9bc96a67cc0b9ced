//! Protocol data units: function codes, exceptions, requests and responses.

pub mod exception;
pub mod function_code;
pub mod request;
pub mod response;

pub use exception::{ExceptionCode, ExceptionResponse};
pub use function_code::{FunctionCode, FunctionKind};
pub use request::*;
pub use response::*;
