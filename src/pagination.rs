//! Offset-based pagination for list endpoints.
//!
//! Unlike a cursor scheme, the envelope here is the `{page, limit, total,
//! totalPages, hasNext, hasPrev}` shape the control plane's REST contract
//! specifies — simpler to reason about for an admin-facing listing where
//! jumping to an arbitrary page is expected.

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, FieldError};

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
pub struct ValidatedPagination {
    pub page: i64,
    pub limit: i64,
}

impl ValidatedPagination {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

impl PaginationParams {
    /// Validates and clamps pagination parameters. `page` defaults to 1 and
    /// must be at least 1; `limit` defaults to 50 and must fall in
    /// `[1, 100]`.
    pub fn validate(&self) -> Result<ValidatedPagination, AppError> {
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);

        let mut errors = Vec::new();
        if page < 1 {
            errors.push(FieldError::new("page", "page must be at least 1"));
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            errors.push(FieldError::new(
                "limit",
                format!("limit must be between 1 and {MAX_LIMIT}"),
            ));
        }

        if errors.is_empty() {
            Ok(ValidatedPagination { page, limit })
        } else {
            Err(AppError::validation(errors))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
    #[serde(rename = "hasNext")]
    pub has_next: bool,
    #[serde(rename = "hasPrev")]
    pub has_prev: bool,
}

impl PageInfo {
    pub fn build(validated: ValidatedPagination, total: i64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + validated.limit - 1) / validated.limit
        };
        Self {
            page: validated.page,
            limit: validated.limit,
            total,
            total_pages,
            has_next: validated.page < total_pages,
            has_prev: validated.page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_page_1_limit_50() {
        let params = PaginationParams { page: None, limit: None };
        let validated = params.validate().unwrap();
        assert_eq!(validated.page, 1);
        assert_eq!(validated.limit, 50);
    }

    #[test]
    fn limit_100_is_accepted_limit_101_is_rejected() {
        let ok = PaginationParams { page: Some(1), limit: Some(100) };
        assert!(ok.validate().is_ok());
        let bad = PaginationParams { page: Some(1), limit: Some(101) };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn page_below_one_is_rejected() {
        let bad = PaginationParams { page: Some(0), limit: Some(10) };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn offset_is_zero_indexed() {
        let validated = ValidatedPagination { page: 3, limit: 20 };
        assert_eq!(validated.offset(), 40);
    }

    #[test]
    fn page_info_computes_total_pages_and_has_next() {
        let validated = ValidatedPagination { page: 1, limit: 10 };
        let info = PageInfo::build(validated, 25);
        assert_eq!(info.total_pages, 3);
        assert!(info.has_next);
        assert!(!info.has_prev);
    }

    #[test]
    fn page_info_zero_total_yields_zero_pages() {
        let validated = ValidatedPagination { page: 1, limit: 10 };
        let info = PageInfo::build(validated, 0);
        assert_eq!(info.total_pages, 0);
        assert!(!info.has_next);
    }
}
