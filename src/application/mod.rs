//! Application Layer
//!
//! Chat logic and the data transfer objects exchanged with the REST API.
//! This layer sits between the real-time and HTTP infrastructure and the
//! domain model.

pub mod services;
pub mod dto;
