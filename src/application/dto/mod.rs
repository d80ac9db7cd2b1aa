//! Data Transfer Objects
//!
//! Request and response DTOs for the chat REST API.

pub mod request;
pub mod response;

pub use request::*;
pub use response::*;
