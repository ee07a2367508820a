//! src/model/pagination.rs

use std::ops::Range;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow {
    /// 1-based page actually shown after clamping.
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_items: usize,
    /// Index range into the full listing.
    pub range: Range<usize>,
}

impl PageWindow {
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let end: usize = self.range.end.min(items.len());
        let start: usize = self.range.start.min(end);

        &items[start..end]
    }
}

/// Computes the window for `page` over `entries`.
///
/// `page_size` is raised to at least 1, the page count is never below 1 and
/// `page` is clamped into `[1, total_pages]`.
pub fn paginate<T>(entries: &[T], page: usize, page_size: usize) -> PageWindow {
    let total_items: usize = entries.len();
    let page_size: usize = page_size.max(1);
    let total_pages: usize = total_items.div_ceil(page_size).max(1);
    let page: usize = page.clamp(1, total_pages);

    let start: usize = ((page - 1) * page_size).min(total_items);
    let end: usize = (start + page_size).min(total_items);

    PageWindow {
        page,
        page_size,
        total_pages,
        total_items,
        range: start..end,
    }
}
