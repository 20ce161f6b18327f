//! Tag routing: resolve extracted tags to destination channels.

use crate::models::TagTargets;
use std::collections::HashMap;

/// Resolve the ordered, de-duplicated destination channel list for the
/// given tags.
///
/// Tags are visited in input order; each binding's channels are appended
/// first-seen-first, skipping channels already resolved through an earlier
/// tag. Tags without a binding are skipped without error. Legacy scalar
/// bindings are normalized here and never leave this function.
#[must_use]
pub fn route(tags: &[String], mapping: &HashMap<String, TagTargets>) -> Vec<i64> {
    let mut destinations = Vec::new();
    for tag in tags {
        let Some(targets) = mapping.get(tag) else {
            continue;
        };
        for channel_id in targets.channels() {
            if !destinations.contains(&channel_id) {
                destinations.push(channel_id);
            }
        }
    }
    destinations
}
