// Request handlers behind the `sheetwise` binary, usable from any front end.

pub mod exit_codes;
pub mod service;

pub use service::{ApiError, ApiResponse, Service};
