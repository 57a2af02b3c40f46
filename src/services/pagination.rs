use std::collections::HashMap;

use serde::Serialize;

use crate::models::{RecommendationPool, RecommendedBook};

pub const MIN_PER_PAGE: i64 = 6;
pub const MAX_PER_PAGE: i64 = 60;

/// One slice of a recommendation pool
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Page {
    pub items: Vec<RecommendedBook>,
    /// Reasons for the items on this page only
    pub reasons: HashMap<String, String>,
    pub page: i64,
    pub per_page: i64,
    pub has_next: bool,
    pub total_items: usize,
}

/// Plain sub-range of the pool; never re-sorts
///
/// `per_page` is clamped to [6, 60] and `page` to at least 1. Pages past the
/// end are empty with `has_next = false`.
pub fn page(pool: &RecommendationPool, page: i64, per_page: i64) -> Page {
    let per_page = per_page.clamp(MIN_PER_PAGE, MAX_PER_PAGE);
    let page = page.max(1);
    let total = pool.items.len();

    let start = usize::try_from(page - 1)
        .ok()
        .and_then(|p| p.checked_mul(per_page as usize))
        .unwrap_or(usize::MAX);
    let end = start.saturating_add(per_page as usize);

    let items: Vec<RecommendedBook> = if start >= total {
        Vec::new()
    } else {
        pool.items[start..end.min(total)].to_vec()
    };

    let reasons = items
        .iter()
        .filter_map(|b| pool.reasons.get(&b.asin).map(|r| (b.asin.clone(), r.clone())))
        .collect();

    Page {
        items,
        reasons,
        page,
        per_page,
        has_next: end < total,
        total_items: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pool_of;
    use proptest::prelude::*;

    fn asins(page: &Page) -> Vec<String> {
        page.items.iter().map(|b| b.asin.clone()).collect()
    }

    #[test]
    fn test_third_page_of_fifty() {
        let pool = pool_of(50);
        let result = page(&pool, 3, 24);

        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].asin, pool.items[48].asin);
        assert_eq!(result.items[1].asin, pool.items[49].asin);
        assert!(!result.has_next);
        assert_eq!(result.total_items, 50);
        assert_eq!(result.reasons.len(), 2);
    }

    #[test]
    fn test_per_page_clamped() {
        let pool = pool_of(100);
        assert_eq!(page(&pool, 1, 1).per_page, 6);
        assert_eq!(page(&pool, 1, 1).items.len(), 6);
        assert_eq!(page(&pool, 1, 500).per_page, 60);
    }

    #[test]
    fn test_page_clamped_to_first() {
        let pool = pool_of(10);
        assert_eq!(page(&pool, 0, 6).page, 1);
        assert_eq!(asins(&page(&pool, -4, 6)), asins(&page(&pool, 1, 6)));
    }

    #[test]
    fn test_out_of_range_is_empty() {
        let pool = pool_of(10);
        let result = page(&pool, 5, 6);
        assert!(result.items.is_empty());
        assert!(!result.has_next);

        let huge = page(&pool, i64::MAX, 60);
        assert!(huge.items.is_empty());
        assert!(!huge.has_next);
    }

    #[test]
    fn test_exact_boundary_has_no_next() {
        let pool = pool_of(12);
        assert!(page(&pool, 1, 6).has_next);
        assert!(!page(&pool, 2, 6).has_next);
    }

    proptest! {
        #[test]
        fn prop_consecutive_pages_concatenate(len in 20usize..200) {
            let pool = pool_of(len);
            let mut joined = asins(&page(&pool, 1, 10));
            joined.extend(asins(&page(&pool, 2, 10)));
            prop_assert_eq!(joined, asins(&page(&pool, 1, 20)));
        }

        #[test]
        fn prop_page_never_exceeds_pool(len in 0usize..150, p in -3i64..40, per in -5i64..100) {
            let pool = pool_of(len);
            let result = page(&pool, p, per);
            prop_assert!(result.items.len() <= result.per_page as usize);
            prop_assert!(result.items.len() <= len);
            prop_assert!(result.reasons.keys().all(|k| result.items.iter().any(|b| &b.asin == k)));
        }
    }
}
