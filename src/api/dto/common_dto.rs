//! Shared DTO types used across multiple endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Default number of items returned by list endpoints.
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Upper bound on `limit` for list endpoints.
pub const MAX_LIST_LIMIT: u32 = 100;

/// Query parameters for list endpoints.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Maximum number of items, newest first. Clamped to `1..=100`;
    /// defaults to 50.
    pub limit: Option<u32>,
}

impl ListParams {
    /// Effective limit after defaulting and clamping.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

/// Envelope for every successful REST payload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DataResponse<T> {
    /// Response payload.
    pub data: T,
}

impl<T> DataResponse<T> {
    /// Wraps a payload.
    pub const fn new(data: T) -> Self {
        Self { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(ListParams::default().limit(), 50);
        assert_eq!(ListParams { limit: Some(0) }.limit(), 1);
        assert_eq!(ListParams { limit: Some(7) }.limit(), 7);
        assert_eq!(ListParams { limit: Some(5_000) }.limit(), 100);
    }
}
