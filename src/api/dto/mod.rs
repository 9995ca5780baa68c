//! Data Transfer Objects for REST request/response serialization.
//!
//! Field names are camelCase on the wire; timestamps are RFC 3339 strings.

pub mod commentary_dto;
pub mod common_dto;
pub mod match_dto;

pub use commentary_dto::*;
pub use common_dto::*;
pub use match_dto::*;
