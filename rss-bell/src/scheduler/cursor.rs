//! Deduplication cursor and new-item selection.
//!
//! A feed is handled in timestamp mode when every item carries a publication
//! time, and in GUID mode otherwise. The cursor remembers the newest item
//! already seen in the mode it was seeded in.

use chrono::{DateTime, Utc};

use crate::feed::FeedItem;

/// Minimum distance, in milliseconds, between an item's publication time
/// and the cursor for the item to count as new.
pub const TIMESTAMP_TOLERANCE_MS: i64 = 1_000;

/// The newest item a task has already seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupCursor {
    Timestamp(DateTime<Utc>),
    Guid(String),
}

/// How a list of items is compared against the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupMode {
    Timestamp,
    Guid,
}

impl DedupMode {
    /// Timestamp mode iff every item is timestamped.
    pub fn for_items(items: &[FeedItem]) -> Self {
        if !items.is_empty() && items.iter().all(|item| item.published.is_some()) {
            Self::Timestamp
        } else {
            Self::Guid
        }
    }
}

/// What a run cycle should do with a fetched item list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleDecision {
    /// Nothing to report.
    UpToDate,
    /// Dispatch `items` (oldest first), then move to `cursor`.
    Dispatch {
        items: Vec<FeedItem>,
        cursor: DedupCursor,
    },
    /// The feed switched mode; adopt `cursor` without dispatching.
    Reseed(DedupCursor),
}

impl DedupCursor {
    /// Initial cursor for a freshly fetched item list.
    ///
    /// An empty feed is seeded with `now`, so that anything published later
    /// is reported.
    pub fn seed(items: &[FeedItem], now: DateTime<Utc>) -> Self {
        if items.is_empty() {
            return Self::Timestamp(now);
        }
        match DedupMode::for_items(items) {
            DedupMode::Timestamp => Self::Timestamp(newest_timestamp(items).unwrap_or(now)),
            DedupMode::Guid => Self::Guid(items[0].guid.clone()),
        }
    }

    pub fn mode(&self) -> DedupMode {
        match self {
            Self::Timestamp(_) => DedupMode::Timestamp,
            Self::Guid(_) => DedupMode::Guid,
        }
    }

    /// Compare a fetched item list (in feed order) against the cursor.
    pub fn evaluate(&self, items: &[FeedItem]) -> CycleDecision {
        if items.is_empty() {
            return CycleDecision::UpToDate;
        }

        match (DedupMode::for_items(items), self) {
            (DedupMode::Timestamp, Self::Timestamp(last)) => {
                let new_items = select_by_timestamp(*last, items);
                match new_items.last().and_then(|item| item.published) {
                    Some(newest) => CycleDecision::Dispatch {
                        cursor: Self::Timestamp(newest.max(*last)),
                        items: new_items,
                    },
                    None => CycleDecision::UpToDate,
                }
            }
            (DedupMode::Guid, Self::Guid(last)) => match select_by_guid(last, items) {
                Some(head) => CycleDecision::Dispatch {
                    cursor: Self::Guid(head.guid.clone()),
                    items: vec![head.clone()],
                },
                None => CycleDecision::UpToDate,
            },
            (DedupMode::Timestamp, Self::Guid(_)) => {
                match newest_timestamp(items) {
                    Some(newest) => CycleDecision::Reseed(Self::Timestamp(newest)),
                    None => CycleDecision::UpToDate,
                }
            }
            (DedupMode::Guid, Self::Timestamp(_)) => {
                CycleDecision::Reseed(Self::Guid(items[0].guid.clone()))
            }
        }
    }
}

/// Items published at least [`TIMESTAMP_TOLERANCE_MS`] after `last`,
/// oldest first.
///
/// Items are ordered newest first and the newer-than-cursor prefix is kept,
/// so the feed's own ordering does not matter. Untimestamped items count as
/// old.
pub fn select_by_timestamp(last: DateTime<Utc>, items: &[FeedItem]) -> Vec<FeedItem> {
    let mut sorted: Vec<&FeedItem> = items.iter().collect();
    // Newest first; `None` sorts last.
    sorted.sort_by(|a, b| b.published.cmp(&a.published));

    let mut new_items: Vec<FeedItem> = sorted
        .into_iter()
        .take_while(|item| {
            item.published
                .is_some_and(|ts| (ts - last).num_milliseconds() >= TIMESTAMP_TOLERANCE_MS)
        })
        .cloned()
        .collect();
    new_items.reverse();
    new_items
}

/// The head item, when its GUID differs from `last`.
///
/// Only the head is inspected: at most one new item per cycle.
pub fn select_by_guid<'a>(last: &str, items: &'a [FeedItem]) -> Option<&'a FeedItem> {
    items.first().filter(|head| head.guid != last)
}

fn newest_timestamp(items: &[FeedItem]) -> Option<DateTime<Utc>> {
    items.iter().filter_map(|item| item.published).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn stamped(title: &str, secs: i64) -> FeedItem {
        FeedItem::new(title, format!("https://e.x/{title}"), title, Some(t(secs)))
    }

    fn plain(guid: &str) -> FeedItem {
        FeedItem::new(guid, format!("https://e.x/{guid}"), guid, None)
    }

    fn titles(items: &[FeedItem]) -> Vec<&str> {
        items.iter().map(|i| i.title.as_str()).collect()
    }

    #[test]
    fn test_seed() {
        let now = t(1000);
        assert_eq!(DedupCursor::seed(&[], now), DedupCursor::Timestamp(now));
        assert_eq!(
            DedupCursor::seed(&[stamped("a", 5), stamped("b", 20), stamped("c", 10)], now),
            DedupCursor::Timestamp(t(20))
        );
        assert_eq!(
            DedupCursor::seed(&[plain("g2"), stamped("g1", 0)], now),
            DedupCursor::Guid("g2".to_string())
        );
    }

    #[test]
    fn test_timestamp_scenario() {
        // Seeded from [A(10:00), B(09:00)].
        let a = stamped("A", 0);
        let b = stamped("B", -3600);
        let cursor = DedupCursor::seed(&[a.clone(), b.clone()], t(0));
        assert_eq!(cursor, DedupCursor::Timestamp(t(0)));

        // C(10:05) appears.
        let c = stamped("C", 300);
        let decision = cursor.evaluate(&[c.clone(), a.clone(), b.clone()]);
        let CycleDecision::Dispatch { items, cursor } = decision else {
            panic!("expected dispatch");
        };
        assert_eq!(titles(&items), vec!["C"]);
        assert_eq!(cursor, DedupCursor::Timestamp(t(300)));

        // Same feed again: nothing new.
        assert_eq!(
            cursor.evaluate(&[c.clone(), a.clone(), b.clone()]),
            CycleDecision::UpToDate
        );

        // D(10:10) and E(10:07) together: dispatched oldest first.
        let d = stamped("D", 600);
        let e = stamped("E", 420);
        let decision = cursor.evaluate(&[d, e, c, a, b]);
        let CycleDecision::Dispatch { items, cursor } = decision else {
            panic!("expected dispatch");
        };
        assert_eq!(titles(&items), vec!["E", "D"]);
        assert_eq!(cursor, DedupCursor::Timestamp(t(600)));
    }

    #[test]
    fn test_timestamp_tolerance() {
        let cursor = DedupCursor::Timestamp(t(0));
        let within = FeedItem::new("x", "l", "x", Some(t(0) + TimeDelta::milliseconds(999)));
        assert_eq!(cursor.evaluate(&[within]), CycleDecision::UpToDate);

        let at = FeedItem::new("y", "l", "y", Some(t(1)));
        assert!(matches!(
            cursor.evaluate(&[at]),
            CycleDecision::Dispatch { .. }
        ));
    }

    #[test]
    fn test_timestamp_ignores_feed_order() {
        let items = vec![stamped("old", -10), stamped("new2", 20), stamped("new1", 10)];
        let new_items = select_by_timestamp(t(0), &items);
        assert_eq!(titles(&new_items), vec!["new1", "new2"]);
    }

    #[test]
    fn test_timestamp_cursor_never_moves_backward() {
        let cursor = DedupCursor::Timestamp(t(100));
        let items = vec![stamped("older", 50), stamped("oldest", 0)];
        assert_eq!(cursor.evaluate(&items), CycleDecision::UpToDate);
    }

    #[test]
    fn test_guid_scenario() {
        let g1 = plain("g1");
        let cursor = DedupCursor::seed(std::slice::from_ref(&g1), t(0));
        assert_eq!(cursor, DedupCursor::Guid("g1".to_string()));

        // Unchanged head.
        assert_eq!(cursor.evaluate(&[g1.clone()]), CycleDecision::UpToDate);

        // New head g2.
        let g2 = plain("g2");
        let decision = cursor.evaluate(&[g2.clone(), g1.clone()]);
        assert_eq!(
            decision,
            CycleDecision::Dispatch {
                items: vec![g2.clone()],
                cursor: DedupCursor::Guid("g2".to_string()),
            }
        );
    }

    #[test]
    fn test_guid_reports_only_head() {
        let cursor = DedupCursor::Guid("g1".to_string());
        let items = vec![plain("g3"), plain("g2"), plain("g1")];
        let CycleDecision::Dispatch { items, .. } = cursor.evaluate(&items) else {
            panic!("expected dispatch");
        };
        assert_eq!(titles(&items), vec!["g3"]);
    }

    #[test]
    fn test_guid_mode_when_any_item_untimestamped() {
        let items = vec![stamped("a", 10), plain("b")];
        assert_eq!(DedupMode::for_items(&items), DedupMode::Guid);
        assert_eq!(DedupMode::for_items(&[]), DedupMode::Guid);
    }

    #[test]
    fn test_mode_switch_reseeds() {
        let cursor = DedupCursor::Timestamp(t(0));
        assert_eq!(
            cursor.evaluate(&[plain("g1"), stamped("a", 30)]),
            CycleDecision::Reseed(DedupCursor::Guid("g1".to_string()))
        );

        let cursor = DedupCursor::Guid("g1".to_string());
        assert_eq!(
            cursor.evaluate(&[stamped("a", 30), stamped("b", 10)]),
            CycleDecision::Reseed(DedupCursor::Timestamp(t(30)))
        );
    }

    #[test]
    fn test_empty_items_up_to_date() {
        assert_eq!(
            DedupCursor::Guid("g".to_string()).evaluate(&[]),
            CycleDecision::UpToDate
        );
    }
}
