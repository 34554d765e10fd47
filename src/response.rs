//! Standard response envelope helpers.

use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Page descriptor attached to every list response.
#[derive(Clone, Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u32,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let pages = if limit == 0 {
            0
        } else {
            ((total + u64::from(limit) - 1) / u64::from(limit)) as u32
        };
        Pagination { page, limit, total, pages }
    }
}

/// List envelope. `data` mirrors `results` for client compatibility; both
/// carry the hydrated page.
#[derive(Serialize)]
pub struct ListPage {
    pub results: Vec<Value>,
    pub pagination: Pagination,
    pub data: Vec<Value>,
}

impl ListPage {
    pub fn new(results: Vec<Value>, pagination: Pagination) -> Self {
        ListPage {
            data: results.clone(),
            results,
            pagination,
        }
    }
}

pub fn success_one<T: Serialize>(data: T) -> SuccessOne<T> {
    SuccessOne { data, meta: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_rounds_pages_up() {
        let p = Pagination::new(1, 20, 41);
        assert_eq!(p.pages, 3);
        let p = Pagination::new(1, 20, 40);
        assert_eq!(p.pages, 2);
        let p = Pagination::new(1, 20, 0);
        assert_eq!(p.pages, 0);
    }
}
