// src/models/topic.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Topic {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTopicRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 20000))]
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PageParams {
    /// Clamped `(page, per_page, offset)`. `None` when the offset does not fit
    /// in an `i64`.
    pub fn resolve(&self, default_size: i64, max_size: i64) -> Option<(i64, i64, i64)> {
        let per_page = self.per_page.unwrap_or(default_size).clamp(1, max_size);
        let page = self.page.unwrap_or(1).max(1);
        let offset = (page - 1).checked_mul(per_page)?;
        Some((page, per_page, offset))
    }
}

/// One page of topics plus the numbers a pager needs.
#[derive(Debug, Serialize)]
pub struct TopicPage {
    pub topics: Vec<Topic>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: Option<i64>, per_page: Option<i64>) -> PageParams {
        PageParams { page, per_page }
    }

    #[test]
    fn defaults_and_clamping() {
        assert_eq!(params(None, None).resolve(10, 100), Some((1, 10, 0)));
        assert_eq!(params(Some(3), Some(20)).resolve(10, 100), Some((3, 20, 40)));
        assert_eq!(params(Some(-5), Some(0)).resolve(10, 100), Some((1, 1, 0)));
        assert_eq!(params(Some(2), Some(5000)).resolve(10, 100), Some((2, 100, 100)));
    }

    #[test]
    fn huge_page_is_out_of_range() {
        assert_eq!(params(Some(i64::MAX), Some(10)).resolve(10, 100), None);
    }
}
