//! Common types and utilities shared across handlers and services

use sea_orm::{ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QuerySelect, Select};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::ValidationError;

/// Hard upper bound on any page size
pub const MAX_PER_PAGE: u64 = 100;

/// Page window computed from a total row count and the requested page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub total_items: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub total_pages: u64,
    /// Rows to skip to reach `current_page`
    pub offset: u64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl Pagination {
    /// `per_page` is clamped to `1..=MAX_PER_PAGE` and `page` to `1..=max(total_pages, 1)`
    pub fn new(total_items: u64, page: u64, per_page: u64) -> Self {
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let total_pages = total_items.div_ceil(per_page);
        let current_page = page.clamp(1, total_pages.max(1));
        let offset = (current_page - 1) * per_page;

        Self {
            total_items,
            per_page,
            current_page,
            total_pages,
            offset,
            has_previous: current_page > 1,
            has_next: current_page < total_pages,
        }
    }
}

/// Query string parameters accepted by every list endpoint
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl PageParams {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1)
    }

    /// Requested page size, falling back to `default` and capped at `max`
    pub fn per_page(&self, default: u64, max: u64) -> u64 {
        self.per_page.unwrap_or(default).min(max)
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

/// Counts the rows matched by `select` and loads the requested window of them
pub async fn fetch_page<'db, E, C>(
    db: &'db C,
    select: Select<E>,
    page: u64,
    per_page: u64,
) -> Result<Page<E::Model>, DbErr>
where
    E: EntityTrait,
    E::Model: Send + Sync + 'db,
    C: ConnectionTrait,
{
    let total = select.clone().count(db).await?;
    let pagination = Pagination::new(total, page, per_page);
    let items = select
        .offset(pagination.offset)
        .limit(pagination.per_page)
        .all(db)
        .await?;

    Ok(Page { items, pagination })
}

/// Rejects text that is empty once surrounding whitespace is removed
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}
