//! Pagination and sorting parameters for list endpoints.
use std::cmp::Ordering;

use serde::Serialize;

use crate::core::{
    movie::Movie,
    validator::{Validator, permitted_value},
};

pub const MOVIE_SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            sort: "id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl Filters {
    /// Column named by `sort`, without its direction prefix. Only meaningful after validation.
    pub fn sort_column(&self) -> &str {
        self.sort.trim_start_matches('-')
    }

    pub fn sort_direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        }
    }

    pub fn limit(&self) -> usize {
        usize::try_from(self.page_size).unwrap_or(0)
    }

    pub fn offset(&self) -> usize {
        usize::try_from((self.page - 1) * self.page_size).unwrap_or(0)
    }

    /// Ordering for two movies under this filter; ties fall back to ascending id.
    pub fn compare_movies(&self, a: &Movie, b: &Movie) -> Ordering {
        let primary = match self.sort_column() {
            "title" => a.title.cmp(&b.title),
            "year" => a.year.cmp(&b.year),
            "runtime" => a.runtime.cmp(&b.runtime),
            _ => a.id.cmp(&b.id),
        };
        let primary = match self.sort_direction() {
            SortDirection::Ascending => primary,
            SortDirection::Descending => primary.reverse(),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

pub fn validate_filters(v: &mut Validator, filters: &Filters, safelist: &[&str]) {
    v.check(filters.page > 0, "page", "must be greater than zero");
    v.check(
        filters.page <= 10_000_000,
        "page",
        "must be a maximum of 10 million",
    );
    v.check(filters.page_size > 0, "page_size", "must be greater than zero");
    v.check(
        filters.page_size <= 100,
        "page_size",
        "must be a maximum of 100",
    );
    v.check(
        permitted_value(&filters.sort.as_str(), safelist),
        "sort",
        "invalid sort value",
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}
