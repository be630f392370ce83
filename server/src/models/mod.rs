//! Data models for the marketplace offer core

use serde::{Deserialize, Serialize};

pub mod offer;
pub mod review;

pub use offer::*;
pub use review::*;

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            details: None,
        }
    }
}

/// Structured error information attached to failed responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetails {
    pub kind: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_status: Option<OfferStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_status: Option<OfferStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_role: Option<ActorRole>,
}

/// Pagination parameters
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PaginationParams {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 100;

    /// Clamp to `(limit, offset)` with the default and maximum page size applied.
    pub fn resolve(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        let empty = PaginationParams { limit: None, offset: None };
        assert_eq!(empty.resolve(), (50, 0));

        let oversized = PaginationParams { limit: Some(500), offset: Some(-3) };
        assert_eq!(oversized.resolve(), (100, 0));
    }
}
