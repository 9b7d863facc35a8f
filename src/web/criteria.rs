use std::collections::HashMap;

use crate::db::models::Delegation;

/// Tezos mainnet launch year; nothing older can exist.
pub const MIN_YEAR: i32 = 2018;
pub const MAX_YEARS_IN_FUTURE: i32 = 10;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PER_PAGE: u64 = 50;
pub const MAX_PER_PAGE: u64 = 100;

/// Query-parameter validation failure. Displayed as
/// `invalid <param> parameter: <reason>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("invalid year parameter: year must be exactly 4 digits (YYYY format)")]
    YearNotYyyyFormat,

    #[error("invalid year parameter: year must be numeric")]
    YearNotNumeric,

    #[error("invalid year parameter: year must be between {MIN_YEAR} and current year + {MAX_YEARS_IN_FUTURE}")]
    YearOutOfRange,

    #[error("invalid page parameter: page must be numeric")]
    PageNotNumeric,

    #[error("invalid page parameter: page must be positive")]
    PageNotPositive,

    #[error("invalid per_page parameter: per_page must be numeric")]
    PerPageNotNumeric,

    #[error("invalid per_page parameter: per_page must be positive")]
    PerPageNotPositive,

    #[error("invalid per_page parameter: per_page must be between 1 and {MAX_PER_PAGE}")]
    PerPageTooLarge,
}

/// What to read: an optional year filter and a 1-based page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegationsCriteria {
    pub year: Option<i32>,
    pub page: u64,
    pub per_page: u64,
}

impl Default for DelegationsCriteria {
    fn default() -> Self {
        Self {
            year: None,
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl DelegationsCriteria {
    /// Bind `year`, `page` and `per_page` from raw query parameters.
    /// Empty values count as absent.
    pub fn bind(params: &HashMap<String, String>, current_year: i32) -> Result<Self, BindError> {
        let mut criteria = Self::default();

        if let Some(year) = non_empty(params, "year") {
            criteria.year = Some(parse_year(year, current_year)?);
        }
        if let Some(page) = non_empty(params, "page") {
            criteria.page = parse_page(page)?;
        }
        if let Some(per_page) = non_empty(params, "per_page") {
            criteria.per_page = parse_per_page(per_page)?;
        }

        Ok(criteria)
    }

    pub fn items_to_skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

fn non_empty<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

fn parse_year(raw: &str, current_year: i32) -> Result<i32, BindError> {
    if raw.len() != 4 {
        return Err(BindError::YearNotYyyyFormat);
    }
    let year: i32 = raw
        .parse()
        .ok()
        .filter(|_| raw.bytes().all(|b| b.is_ascii_digit()))
        .ok_or(BindError::YearNotNumeric)?;

    if !(MIN_YEAR..=current_year + MAX_YEARS_IN_FUTURE).contains(&year) {
        return Err(BindError::YearOutOfRange);
    }
    Ok(year)
}

fn parse_page(raw: &str) -> Result<u64, BindError> {
    match raw.parse::<u64>() {
        Ok(0) => Err(BindError::PageNotPositive),
        Ok(page) => Ok(page),
        Err(_) => Err(BindError::PageNotNumeric),
    }
}

fn parse_per_page(raw: &str) -> Result<u64, BindError> {
    match raw.parse::<u64>() {
        Ok(0) => Err(BindError::PerPageNotPositive),
        Ok(n) if n > MAX_PER_PAGE => Err(BindError::PerPageTooLarge),
        Ok(n) => Ok(n),
        Err(_) => Err(BindError::PerPageNotNumeric),
    }
}

/// One page of results, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationsPage {
    pub delegations: Vec<Delegation>,
    pub has_more: bool,
    pub page: u64,
    pub per_page: u64,
}

impl DelegationsPage {
    /// Build a page from a `per_page + 1` row fetch: the extra row only
    /// signals that a next page exists and is dropped.
    pub fn from_overfetch(mut rows: Vec<Delegation>, criteria: &DelegationsCriteria) -> Self {
        let limit = criteria.per_page as usize;
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        Self {
            delegations: rows,
            has_more,
            page: criteria.page,
            per_page: criteria.per_page,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.has_more
    }
}
