//! Numbered pagination for administrative listings.

use serde::Serialize;

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    /// Page numbers below one are treated as the first page.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

/// Why a listing came back the way it did, so callers can tell an
/// unmatched search apart from an empty cache point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Listing {
    Results,
    NoMatches,
    NothingCached,
}

#[derive(Debug, Clone, Serialize)]
pub struct NumberedPage<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u32,
    pub listing: Listing,
}

impl<T> NumberedPage<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: u64, searched: bool) -> Self {
        let listing = match (total, searched) {
            (0, true) => Listing::NoMatches,
            (0, false) => Listing::NothingCached,
            _ => Listing::Results,
        };
        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
            total_pages: total_pages(total, request.per_page),
            listing,
        }
    }
}

pub fn total_pages(total: u64, per_page: u32) -> u32 {
    let per_page = u64::from(per_page.max(1));
    u32::try_from(total.div_ceil(per_page)).unwrap_or(u32::MAX)
}
