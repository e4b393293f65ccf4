// Public HTTP API modules

pub mod common;
pub mod documents;
pub mod events;
pub mod export;
pub mod validation;

pub use common::{ErrorResponse, ListResponse};
