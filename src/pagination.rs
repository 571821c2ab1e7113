// Decides which ranking stage slices the result and makes sure only it does

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Applies request values, falling back to `default_limit` and capping at `max_limit`.
    /// Offsets are capped to what an SQL `OFFSET` (BIGINT) can carry.
    pub fn from_request(
        offset: Option<usize>,
        limit: Option<usize>,
        default_limit: usize,
        max_limit: usize,
    ) -> Self {
        let max_offset = usize::try_from(i64::MAX).unwrap_or(usize::MAX);
        Self {
            offset: offset.unwrap_or(0).min(max_offset),
            limit: limit.unwrap_or(default_limit).min(max_limit),
        }
    }
}

/// The stage that owns offset/limit for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOwner {
    /// Relational store slices with OFFSET/LIMIT
    Store,
    /// Indexer slices with skip/first
    Indexer,
    /// Ranking happened in-process over the full scope; sliced locally
    Composer,
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationReconciler {
    owner: ScopeOwner,
    page: Page,
}

impl PaginationReconciler {
    pub fn new(owner: ScopeOwner, page: Page) -> Self {
        Self { owner, page }
    }

    pub fn owner(&self) -> ScopeOwner {
        self.owner
    }

    /// The window a stage may pass to its data source. Every stage other
    /// than the owner gets `None`, so it cannot slice a second time.
    pub fn window_for(&self, stage: ScopeOwner) -> Option<Page> {
        (stage == self.owner).then_some(self.page)
    }

    /// Slices `items` when the composer owns the scope; sources that already
    /// sliced hand their output through untouched.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        match self.owner {
            ScopeOwner::Composer => items
                .into_iter()
                .skip(self.page.offset)
                .take(self.page.limit)
                .collect(),
            ScopeOwner::Store | ScopeOwner::Indexer => items,
        }
    }

    /// Window over a trailing segment that follows `owned_total` entries the
    /// owner has already sliced. `None` when the page ends inside the owned
    /// segment.
    pub fn residual(&self, owned_total: usize) -> Option<Page> {
        let owned_in_page = owned_total
            .saturating_sub(self.page.offset)
            .min(self.page.limit);
        let limit = self.page.limit - owned_in_page;
        if limit == 0 {
            return None;
        }
        Some(Page::new(self.page.offset.saturating_sub(owned_total), limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_owner_receives_a_window() {
        let page = Page::new(20, 10);
        let reconciler = PaginationReconciler::new(ScopeOwner::Indexer, page);
        assert_eq!(reconciler.window_for(ScopeOwner::Indexer), Some(page));
        assert_eq!(reconciler.window_for(ScopeOwner::Store), None);
        assert_eq!(reconciler.window_for(ScopeOwner::Composer), None);
    }

    #[test]
    fn slices_once_when_composer_owns() {
        let items: Vec<i64> = (1..=10).collect();
        let reconciler = PaginationReconciler::new(ScopeOwner::Composer, Page::new(3, 4));
        assert_eq!(reconciler.apply(items.clone()), vec![4, 5, 6, 7]);

        let reconciler = PaginationReconciler::new(ScopeOwner::Store, Page::new(3, 4));
        assert_eq!(reconciler.apply(items.clone()), items);
    }

    #[test]
    fn residual_window_covers_the_tail_only() {
        let reconciler = PaginationReconciler::new(ScopeOwner::Indexer, Page::new(0, 10));
        assert_eq!(reconciler.residual(10), None);
        assert_eq!(reconciler.residual(25), None);
        assert_eq!(reconciler.residual(7), Some(Page::new(0, 3)));

        let reconciler = PaginationReconciler::new(ScopeOwner::Indexer, Page::new(20, 10));
        assert_eq!(reconciler.residual(25), Some(Page::new(0, 5)));
        assert_eq!(reconciler.residual(5), Some(Page::new(15, 10)));
    }

    #[test]
    fn request_limits_are_capped() {
        assert_eq!(Page::from_request(None, None, 10, 100), Page::new(0, 10));
        assert_eq!(Page::from_request(Some(5), Some(500), 10, 100), Page::new(5, 100));
    }

    #[test]
    fn request_offsets_fit_a_bigint() {
        let page = Page::from_request(Some(usize::MAX), None, 10, 100);
        assert_eq!(i64::try_from(page.offset).ok(), Some(i64::MAX));
    }
}
