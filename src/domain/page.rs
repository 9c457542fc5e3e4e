use serde::Serialize;

/// One-based page window over a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    /// Out-of-range input is clamped rather than rejected: a page below 1
    /// becomes 1, a size outside `1..=max_per_page` becomes `default_per_page`.
    pub fn clamped(
        page: Option<u32>,
        per_page: Option<u32>,
        default_per_page: u32,
        max_per_page: u32,
    ) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let per_page = per_page
            .filter(|n| (1..=max_per_page).contains(n))
            .unwrap_or(default_per_page);
        Self { page, per_page }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }

    pub fn pagination(&self, total: u64) -> Pagination {
        let per_page = u64::from(self.per_page.max(1));
        Pagination {
            current_page: self.page,
            per_page: self.per_page,
            total_items: total,
            total_pages: total.div_ceil(per_page),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u64,
}
