// src/pagination.rs
use crate::error::ApiError;
use actix_web::HttpRequest;
use serde::{Deserialize, Serialize};

pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Deserialize, Debug, Default)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
    offset: i64,
}

fn invalid_page() -> ApiError {
    ApiError::NotFound("Invalid page".to_string())
}

impl PageParams {
    pub fn resolve(&self, default_size: i64) -> Result<PageRequest, ApiError> {
        let page = self.page.unwrap_or(1);
        let size = match self.limit {
            Some(limit) if limit > 0 => limit.min(MAX_PAGE_SIZE),
            _ => default_size,
        };
        PageRequest::new(page, size)
    }
}

impl PageRequest {
    /// Fails with "Invalid page" when `page` is below 1 or its offset does
    /// not fit in an `i64`.
    pub fn new(page: i64, size: i64) -> Result<Self, ApiError> {
        if page < 1 {
            return Err(invalid_page());
        }
        let offset = (page - 1).checked_mul(size).ok_or_else(invalid_page)?;
        Ok(Self { page, size, offset })
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Only the first page may be empty.
    pub fn ensure_in_range(&self, count: i64) -> Result<(), ApiError> {
        if self.page > 1 && self.offset >= count {
            return Err(invalid_page());
        }
        Ok(())
    }
}

#[derive(Serialize, Debug)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: i64, request: PageRequest, link: &PageLink) -> Self {
        let next = (request.page.saturating_mul(request.size) < count).then(|| link.to(request.page + 1));
        let previous = (request.page > 1).then(|| link.to(request.page - 1));
        Self {
            count,
            next,
            previous,
            results,
        }
    }
}

/// Absolute URL of the current listing with its query string minus `page`.
#[derive(Debug, Clone)]
pub struct PageLink {
    base: String,
    query: Vec<String>,
}

impl PageLink {
    pub fn new(base: impl Into<String>, query_string: &str) -> Self {
        let query = query_string
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| pair.split('=').next() != Some("page"))
            .map(str::to_string)
            .collect();
        Self {
            base: base.into(),
            query,
        }
    }

    pub fn from_request(req: &HttpRequest) -> Self {
        let info = req.connection_info();
        let base = format!("{}://{}{}", info.scheme(), info.host(), req.path());
        Self::new(base, req.query_string())
    }

    pub fn to(&self, page: i64) -> String {
        let mut query = self.query.clone();
        query.push(format!("page={page}"));
        format!("{}?{}", self.base, query.join("&"))
    }
}
