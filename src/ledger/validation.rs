//! Input validation for currencies and pagination
//!
//! `Currency` keeps its field private so every instance went through `new()`.

use std::fmt;

use super::error::LedgerError;

/// Currencies accounts may be opened in.
pub const SUPPORTED_CURRENCIES: &[&str] = &["USD", "EUR", "CAD", "SGD", "IDR", "AUD"];

/// Largest page the store will return in one query.
pub const MAX_QUERY_LIMIT: i64 = 100;

/// Largest page the service facade accepts from callers.
pub const MAX_PAGE_SIZE: i64 = 10;

/// Validated ISO-4217 style currency code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Currency(String);

impl Currency {
    /// # Validation Rules
    /// - Exactly 3 uppercase ASCII letters
    /// - Listed in [`SUPPORTED_CURRENCIES`]
    ///
    /// # Examples
    /// ```
    /// use simple_bank::ledger::validation::Currency;
    ///
    /// assert_eq!(Currency::new("USD").unwrap().as_str(), "USD");
    /// assert!(Currency::new("usd").is_err());
    /// assert!(Currency::new("XYZ").is_err());
    /// ```
    pub fn new(code: &str) -> Result<Self, LedgerError> {
        let code = code.trim();

        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(LedgerError::InvalidArgument(format!(
                "currency must be 3 uppercase letters: got '{}'",
                code
            )));
        }

        if !SUPPORTED_CURRENCIES.contains(&code) {
            return Err(LedgerError::InvalidArgument(format!(
                "unsupported currency '{}'",
                code
            )));
        }

        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Currency {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Store-level bounds for LIMIT/OFFSET queries.
pub fn check_query_bounds(limit: i64, offset: i64) -> Result<(), LedgerError> {
    if !(1..=MAX_QUERY_LIMIT).contains(&limit) {
        return Err(LedgerError::InvalidArgument(format!(
            "limit must be between 1 and {}: got {}",
            MAX_QUERY_LIMIT, limit
        )));
    }
    if offset < 0 {
        return Err(LedgerError::InvalidArgument(format!(
            "offset must not be negative: got {}",
            offset
        )));
    }
    Ok(())
}

/// 1-based page request from a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(page_id: i64, page_size: i64) -> Result<Self, LedgerError> {
        if page_id < 1 {
            return Err(LedgerError::InvalidArgument(format!(
                "page_id must be at least 1: got {}",
                page_id
            )));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(LedgerError::InvalidArgument(format!(
                "page_size must be between 1 and {}: got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }
        let offset = (page_id - 1).checked_mul(page_size).ok_or_else(|| {
            LedgerError::InvalidArgument(format!("page_id out of range: got {}", page_id))
        })?;
        Ok(Self {
            limit: page_size,
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_valid() {
        for code in SUPPORTED_CURRENCIES {
            assert!(Currency::new(code).is_ok(), "{} should be accepted", code);
        }
        assert_eq!(Currency::new(" SGD ").unwrap().as_str(), "SGD");
    }

    #[test]
    fn test_currency_format_rejected() {
        assert!(Currency::new("usd").is_err());
        assert!(Currency::new("US").is_err());
        assert!(Currency::new("USDT").is_err());
        assert!(Currency::new("U5D").is_err());
        assert!(Currency::new("").is_err());
    }

    #[test]
    fn test_currency_unsupported_rejected() {
        let err = Currency::new("JPY").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }

    #[test]
    fn test_currency_display() {
        assert_eq!(Currency::new("IDR").unwrap().to_string(), "IDR");
    }

    #[test]
    fn test_query_bounds() {
        assert!(check_query_bounds(1, 0).is_ok());
        assert!(check_query_bounds(MAX_QUERY_LIMIT, 1_000).is_ok());
        assert!(check_query_bounds(0, 0).is_err());
        assert!(check_query_bounds(MAX_QUERY_LIMIT + 1, 0).is_err());
        assert!(check_query_bounds(5, -1).is_err());
    }

    #[test]
    fn test_page_offsets() {
        assert_eq!(Page::new(1, 10).unwrap(), Page { limit: 10, offset: 0 });
        assert_eq!(Page::new(3, 5).unwrap(), Page { limit: 5, offset: 10 });
    }

    #[test]
    fn test_page_rejects_out_of_range() {
        assert!(Page::new(0, 5).is_err());
        assert!(Page::new(1, 0).is_err());
        assert!(Page::new(1, MAX_PAGE_SIZE + 1).is_err());

        let err = Page::new(i64::MAX, MAX_PAGE_SIZE).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }
}
