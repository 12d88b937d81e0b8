//! Business logic, one module per area of the storefront.
//!
//! Handlers stay thin: they extract and validate input, then call into these
//! functions with the shared [`AppState`](crate::state::AppState).

pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod content;
pub mod orders;

use serde::{Deserialize, Serialize};

use crate::store::Page;

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

/// `?page=&per_page=` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl Pagination {
    /// One-based page number, at least 1.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Page size, 1 to 100 (default 20).
    #[must_use]
    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    #[must_use]
    pub fn to_page(&self) -> Page {
        Page::number(self.page(), self.per_page())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, pagination: Pagination) -> Self {
        Self { data, total, page: pagination.page(), per_page: pagination.per_page() }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated { data: self.data.into_iter().map(f).collect(), total: self.total, page: self.page, per_page: self.per_page }
    }
}
