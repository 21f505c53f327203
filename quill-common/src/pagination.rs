//! Fixed-size pages over an ordered sequence.
//!
//! Page numbers are 1-based. A missing or malformed page number means the
//! first page, and numbers outside `1..=num_pages` clamp to the nearest valid
//! page instead of failing. An empty sequence still has one (empty) page.

use std::num::NonZeroUsize;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Reads the `page` query value. Absent or non-numeric input is page 1; a
/// number too large to represent clamps like any other out-of-range page.
#[must_use]
pub fn parse_page_number(raw: Option<&str>) -> i64 {
    let Some(raw) = raw.map(str::trim) else {
        return 1;
    };

    match raw.parse::<i64>() {
        Ok(number) => number,
        Err(_) if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) => i64::MAX,
        Err(_) => 1,
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Paginator {
    page_size: NonZeroUsize,
}

/// Position of one page inside a sequence of `total` items.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct PageWindow {
    pub number: usize,
    pub num_pages: usize,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub total: usize,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            page_size: NonZeroUsize::new(DEFAULT_PAGE_SIZE).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl Paginator {
    #[must_use]
    pub fn new(page_size: usize) -> Option<Self> {
        NonZeroUsize::new(page_size).map(|page_size| Self { page_size })
    }

    #[must_use]
    pub fn page_size(self) -> usize {
        self.page_size.get()
    }

    #[must_use]
    pub fn num_pages(self, total: usize) -> usize {
        total.div_ceil(self.page_size.get()).max(1)
    }

    #[must_use]
    pub fn window(self, total: usize, requested: i64) -> PageWindow {
        let num_pages = self.num_pages(total);
        let number = usize::try_from(requested.max(1))
            .unwrap_or(usize::MAX)
            .min(num_pages);

        let offset = (number - 1) * self.page_size.get();
        let limit = self.page_size.get().min(total - offset.min(total));

        PageWindow {
            number,
            num_pages,
            total,
            offset,
            limit,
        }
    }

    /// Slices an already ordered sequence.
    #[must_use]
    pub fn paginate<T>(self, items: Vec<T>, requested: i64) -> Page<T> {
        let window = self.window(items.len(), requested);
        let items = items
            .into_iter()
            .skip(window.offset)
            .take(window.limit)
            .collect();

        Page::from_window(window, items)
    }
}

impl<T> Page<T> {
    #[must_use]
    pub fn from_window(window: PageWindow, items: Vec<T>) -> Self {
        Self {
            items,
            number: window.number,
            num_pages: window.num_pages,
            total: window.total,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    #[must_use]
    pub fn previous_number(&self) -> Option<usize> {
        self.has_previous().then(|| self.number - 1)
    }

    #[must_use]
    pub fn next_number(&self) -> Option<usize> {
        self.has_next().then(|| self.number + 1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            total: self.total,
        }
    }
}
