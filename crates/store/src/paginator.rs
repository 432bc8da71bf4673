//! Offset pagination shared by every listing endpoint.

use serde::{Deserialize, Serialize};

const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    #[serde(default = "d_page")]
    pub page: u64,
    #[serde(default = "d_size")]
    pub size: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: d_page(),
            size: d_size(),
        }
    }
}

fn d_page() -> u64 {
    1
}

fn d_size() -> u64 {
    10
}

impl PageRequest {
    /// Clamp to sane bounds: page >= 1, 1 <= size <= 100.
    pub fn clamped(self) -> Self {
        Self {
            page: self.page.max(1),
            size: self.size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.clamped().size as i64
    }

    pub fn offset(&self) -> i64 {
        let c = self.clamped();
        ((c.page - 1) * c.size) as i64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u64,
    pub size: u64,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        let request = request.clamped();
        let pages = if total <= 0 {
            0
        } else {
            (total as u64).div_ceil(request.size)
        };
        Self {
            items,
            total,
            page: request.page,
            size: request.size,
            pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            size: self.size,
            pages: self.pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let req = PageRequest::default();
        assert_eq!(req.page, 1);
        assert_eq!(req.size, 10);
        assert_eq!(req.offset(), 0);
        assert_eq!(req.limit(), 10);
    }

    #[test]
    fn offset_math() {
        let req = PageRequest { page: 3, size: 20 };
        assert_eq!(req.offset(), 40);
        assert_eq!(req.limit(), 20);
    }

    #[test]
    fn zero_page_clamps_to_one() {
        let req = PageRequest { page: 0, size: 10 };
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn oversized_page_clamps() {
        let req = PageRequest { page: 1, size: 5000 };
        assert_eq!(req.limit(), 100);
    }

    #[test]
    fn page_count_rounds_up() {
        let page = Page::new(vec![1, 2, 3], 25, PageRequest { page: 1, size: 10 });
        assert_eq!(page.pages, 3);

        let empty: Page<i32> = Page::new(vec![], 0, PageRequest::default());
        assert_eq!(empty.pages, 0);
    }
}
