//! Which fetched items count as new.
//!
//! The ledger lookups are done by the caller up front, so everything here is
//! plain data in and data out.

use crate::types::Item;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Regular items admitted from one fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegularAdmission {
    /// Newest first, in fetch order.
    pub admitted: Vec<Item>,
    /// A warm cursor was given but did not appear in the fetched window, so
    /// everything not yet in the ledger was admitted.
    pub cursor_gap: bool,
}

/// Published no longer than `window` before `now`.
pub fn is_recent(item: &Item, now: DateTime<Utc>, window: Duration) -> bool {
    now - item.published_at <= window
}

/// Walk `fetched` newest to oldest and admit what is new.
///
/// Without a cursor (cold start) only items within `recency_window` of `now`
/// are admitted; older ones are skipped for good. With a cursor (warm start)
/// the walk stops at the cursor item, so only strictly newer items are
/// admitted. Items already in `processed` are never admitted, and an id
/// repeated within `fetched` is admitted once.
pub fn admit_regular(
    fetched: &[Item],
    cursor: Option<&str>,
    processed: &HashSet<String>,
    now: DateTime<Utc>,
    recency_window: Duration,
) -> RegularAdmission {
    let mut admission = RegularAdmission::default();
    let mut cursor_seen = false;
    let mut seen = HashSet::new();

    for item in fetched {
        match cursor {
            Some(cursor_id) if item.item_id == cursor_id => {
                cursor_seen = true;
                break;
            }
            Some(_) => {}
            None => {
                if !is_recent(item, now, recency_window) {
                    continue;
                }
            }
        }

        if processed.contains(&item.item_id) || !seen.insert(item.item_id.as_str()) {
            continue;
        }

        admission.admitted.push(item.clone());
    }

    admission.cursor_gap = cursor.is_some() && !cursor_seen;
    admission
}

/// Live items not yet delivered. `already_admitted` holds ids taken from the
/// regular fetch in the same sweep, so nothing goes out twice.
pub fn admit_live(live: &[Item], processed: &HashSet<String>, already_admitted: &HashSet<&str>) -> Vec<Item> {
    let mut seen = HashSet::new();
    live.iter()
        .filter(|item| !processed.contains(&item.item_id))
        .filter(|item| !already_admitted.contains(item.item_id.as_str()))
        .filter(|item| seen.insert(item.item_id.clone()))
        .cloned()
        .collect()
}

/// Regular items followed by live items, reversed so that the oldest
/// admitted item is delivered first.
pub fn delivery_order(regular: Vec<Item>, live: Vec<Item>) -> Vec<Item> {
    let mut items = regular;
    items.extend(live);
    items.reverse();
    items
}
