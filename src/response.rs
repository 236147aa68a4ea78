//! The JSON envelope shared by every endpoint, plus pagination helpers.

use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: i64 = 15;
pub const MAX_PER_PAGE: i64 = 100;
/// Highest page number honored; larger requests read as this page.
pub const MAX_PAGE: i64 = 1_000_000;

/// `{"success": bool, "message": string|null, "data": T|null}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, message: Option<String>) -> Self {
        Self {
            success: true,
            message,
            data: Some(data),
        }
    }
}

/// `200 OK` with `data`.
pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(data, None))
}

/// `200 OK` with `data` and a human-readable message.
pub fn ok_with_message<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(data, Some(message.to_string())))
}

/// `201 Created`.
pub fn created<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Created().json(ApiResponse::success(data, Some(message.to_string())))
}

/// Query parameters accepted by every list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    DEFAULT_PER_PAGE
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PageQuery {
    pub fn page(&self) -> i64 {
        self.page.clamp(1, MAX_PAGE)
    }

    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }
}

/// One page of a list endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub last_page: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, query: &PageQuery) -> Self {
        let per_page = query.limit();
        Self {
            items,
            total,
            page: query.page(),
            per_page,
            last_page: ((total + per_page - 1) / per_page).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_page_query_clamps() {
        let query = PageQuery {
            page: 0,
            per_page: 1_000,
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.limit(), MAX_PER_PAGE);
        assert_eq!(query.offset(), 0);

        let query = PageQuery {
            page: 3,
            per_page: 10,
        };
        assert_eq!(query.offset(), 20);
    }

    #[test]
    fn test_huge_page_does_not_overflow_offset() {
        let query = PageQuery {
            page: i64::MAX,
            per_page: 15,
        };
        assert_eq!(query.page(), MAX_PAGE);
        assert_eq!(query.offset(), (MAX_PAGE - 1) * 15);

        let query = PageQuery {
            page: i64::MAX,
            per_page: i64::MAX,
        };
        assert!(query.offset() > 0);
    }

    #[test]
    fn test_last_page() {
        let query = PageQuery::default();
        assert_eq!(Page::<()>::new(vec![], 0, &query).last_page, 1);
        assert_eq!(Page::<()>::new(vec![], 15, &query).last_page, 1);
        assert_eq!(Page::<()>::new(vec![], 16, &query).last_page, 2);
    }

    #[test]
    fn test_page_query_defaults_from_empty_query_string() {
        let query: PageQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.per_page, DEFAULT_PER_PAGE);
    }
}
