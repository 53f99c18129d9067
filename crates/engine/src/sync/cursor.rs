//! Serializable continuation of a page walk.
//!
//! Each processed page yields the next [`PageCursorState`] (or none when the
//! walk is done). The state is plain data, so it can be driven by a loop in
//! the caller or carried through the job queue between workers.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use shopsync_core::{ExecutionMode, StoreId, SyncFamily};

use crate::shopify::{CollectionQuery, PageSelector};

/// How the next page is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pagination {
    /// Page numbers planned from the initial count.
    Pages { current: u32, remaining: VecDeque<u32> },
    /// Opaque cursor handed back by the previous page.
    Cursor { page_info: String },
}

/// Everything a worker needs to process one page of a walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursorState {
    pub store_id: StoreId,
    pub family: SyncFamily,
    pub query: CollectionQuery,
    pub pagination: Pagination,
    pub mode: ExecutionMode,
    pub dry_run: bool,
    /// Timeouts already suffered on the current page.
    pub attempt: u32,
    pub pages_processed: u32,
}

impl PageCursorState {
    /// Plan pages `1..=ceil(total / limit)`, at least one.
    #[must_use]
    pub fn planned(
        store_id: StoreId,
        family: SyncFamily,
        query: CollectionQuery,
        total: u64,
        mode: ExecutionMode,
        dry_run: bool,
    ) -> Self {
        let pages = page_count(total, query.limit);
        Self {
            store_id,
            family,
            query,
            pagination: Pagination::Pages {
                current: 1,
                remaining: (2..=pages).collect(),
            },
            mode,
            dry_run,
            attempt: 0,
            pages_processed: 0,
        }
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.query.limit
    }

    /// The selector for the page this state points at.
    #[must_use]
    pub fn selector(&self) -> PageSelector {
        match &self.pagination {
            Pagination::Pages { current, .. } => PageSelector::Number(*current),
            Pagination::Cursor { page_info } => PageSelector::Cursor(page_info.clone()),
        }
    }

    /// Label for log context: the page number, or `cursor`.
    #[must_use]
    pub fn page_label(&self) -> String {
        match &self.pagination {
            Pagination::Pages { current, .. } => current.to_string(),
            Pagination::Cursor { .. } => "cursor".to_string(),
        }
    }

    /// State for the page after this one, or `None` when the walk is over.
    ///
    /// A returned cursor switches the walk to cursor mode for good; in cursor
    /// mode a missing cursor ends the walk.
    #[must_use]
    pub fn advance(&self, next_cursor: Option<String>) -> Option<Self> {
        let pagination = match (next_cursor, &self.pagination) {
            (Some(page_info), _) => Pagination::Cursor { page_info },
            (None, Pagination::Cursor { .. }) => return None,
            (None, Pagination::Pages { remaining, .. }) => {
                let mut remaining = remaining.clone();
                let current = remaining.pop_front()?;
                Pagination::Pages { current, remaining }
            }
        };

        Some(Self {
            pagination,
            attempt: 0,
            pages_processed: self.pages_processed + 1,
            ..self.clone()
        })
    }

    /// The same page again, one attempt later.
    #[must_use]
    pub fn retry(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// Number of pages needed for `total` records, never less than one.
#[must_use]
pub fn page_count(total: u64, limit: u32) -> u32 {
    let limit = u64::from(limit.max(1));
    u32::try_from(total.div_ceil(limit)).unwrap_or(u32::MAX).max(1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn state(total: u64) -> PageCursorState {
        let query = CollectionQuery::new(
            SyncFamily::Orders,
            50,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        PageCursorState::planned(
            StoreId::new(1),
            SyncFamily::Orders,
            query,
            total,
            ExecutionMode::Immediate,
            false,
        )
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0, 50), 1);
        assert_eq!(page_count(50, 50), 1);
        assert_eq!(page_count(51, 50), 2);
        assert_eq!(page_count(10, 0), 10);
    }

    #[test]
    fn test_page_mode_walks_planned_pages() {
        let first = state(120);
        assert_eq!(first.selector(), PageSelector::Number(1));

        let second = first.advance(None).unwrap();
        assert_eq!(second.selector(), PageSelector::Number(2));
        assert_eq!(second.pages_processed, 1);

        let third = second.advance(None).unwrap();
        assert_eq!(third.selector(), PageSelector::Number(3));
        assert!(third.advance(None).is_none());
    }

    #[test]
    fn test_cursor_switch_is_permanent() {
        let first = state(500);
        let second = first.advance(Some("abc".to_string())).unwrap();
        assert_eq!(second.selector(), PageSelector::Cursor("abc".to_string()));

        // Pages were still planned, but cursor mode ends on a missing cursor.
        assert!(second.advance(None).is_none());
    }

    #[test]
    fn test_retry_keeps_page_and_counts_attempts() {
        let first = state(120).retry();
        assert_eq!(first.attempt, 1);
        assert_eq!(first.selector(), PageSelector::Number(1));
        assert_eq!(first.advance(None).unwrap().attempt, 0);
    }

    #[test]
    fn test_state_survives_serialization() {
        let state = state(120).advance(Some("next".to_string())).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let back: PageCursorState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
