//! Validation utilities for the inventory ledger

use crate::types::Pagination;

pub const REASON_MIN_CHARS: usize = 3;
pub const REASON_MAX_CHARS: usize = 500;

/// Trim a movement reason and check its length in characters
pub fn normalize_reason(reason: &str) -> Result<String, &'static str> {
    let trimmed = reason.trim();
    let len = trimmed.chars().count();
    if len < REASON_MIN_CHARS {
        return Err("Reason must be at least 3 characters");
    }
    if len > REASON_MAX_CHARS {
        return Err("Reason must be at most 500 characters");
    }
    Ok(trimmed.to_string())
}

/// Quantities and thresholds on a stock record can never be negative
pub fn validate_non_negative(value: i64) -> Result<(), &'static str> {
    if value < 0 {
        return Err("Value cannot be negative");
    }
    Ok(())
}

pub fn validate_pagination(pagination: &Pagination) -> Result<(), &'static str> {
    if pagination.page == 0 {
        return Err("Page must start at 1");
    }
    if pagination.per_page == 0 || pagination.per_page > Pagination::MAX_PER_PAGE {
        return Err("Page size must be between 1 and 100");
    }
    Ok(())
}
