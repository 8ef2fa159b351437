//! Interest index: field name → subscriptions interested in it.
//!
//! Every operation takes the lock once for its whole body. Subscriptions are
//! compared by pointer identity.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::subscription::Subscription;

#[derive(Default)]
pub struct InterestIndex {
    state: RwLock<HashMap<String, Vec<Arc<Subscription>>>>,
}

impl InterestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `sub` is present under any of its own field names.
    pub fn has(&self, sub: &Arc<Subscription>) -> bool {
        let state = self.state.read();
        contains(&state, sub)
    }

    /// Insert `sub` under every one of its field names.
    ///
    /// Without `enforce` nothing happens if `sub` is already present. A
    /// subscription without fields is never inserted.
    /// Returns whether an insertion occurred.
    pub fn add(&self, sub: &Arc<Subscription>, enforce: bool) -> bool {
        if sub.fields().is_empty() {
            return false;
        }
        let mut state = self.state.write();
        if !enforce && contains(&state, sub) {
            return false;
        }
        for field in sub.fields() {
            state.entry(field.clone()).or_default().push(Arc::clone(sub));
        }
        true
    }

    /// Remove `sub` from every bucket it appears in.
    /// Returns whether anything was removed.
    pub fn del(&self, sub: &Arc<Subscription>) -> bool {
        let mut state = self.state.write();
        let mut removed = 0;
        for field in sub.fields() {
            let Some(group) = state.get_mut(field) else {
                continue;
            };
            let mut i = 0;
            while i < group.len() {
                if Arc::ptr_eq(&group[i], sub) {
                    group.swap_remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
            if group.is_empty() {
                state.remove(field);
            }
        }
        removed > 0
    }

    /// Snapshot of every subscription registered under the given names.
    pub fn get<S: AsRef<str>>(&self, fields: &[S]) -> Vec<Arc<Subscription>> {
        if fields.is_empty() {
            return Vec::new();
        }
        let state = self.state.read();
        let count = fields
            .iter()
            .filter_map(|field| state.get(field.as_ref()))
            .map(Vec::len)
            .sum();
        let mut subs = Vec::with_capacity(count);
        for field in fields {
            if let Some(group) = state.get(field.as_ref()) {
                subs.extend(group.iter().cloned());
            }
        }
        subs
    }

    /// Total number of entries across all buckets.
    pub fn len(&self) -> usize {
        self.state.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket_len(&self, field: &str) -> usize {
        self.state.read().get(field).map_or(0, Vec::len)
    }
}

fn contains(state: &HashMap<String, Vec<Arc<Subscription>>>, sub: &Arc<Subscription>) -> bool {
    sub.fields().iter().any(|field| {
        state
            .get(field)
            .is_some_and(|group| group.iter().any(|s| Arc::ptr_eq(s, sub)))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use serde_json::Map;

    use super::*;
    use crate::graphql::parse;

    fn sub(id: &str, query: &str) -> Arc<Subscription> {
        Arc::new(Subscription::new(
            id.to_string(),
            query.to_string(),
            None,
            Map::new(),
            parse(query).unwrap(),
            Weak::new(),
        ))
    }

    #[test]
    fn add_is_idempotent_without_enforce() {
        let index = InterestIndex::new();
        let s = sub("1", "subscription { ping }");

        assert!(index.add(&s, false));
        assert!(index.has(&s));
        assert!(!index.add(&s, false));
        assert_eq!(index.bucket_len("ping"), 1);
    }

    #[test]
    fn enforce_inserts_unconditionally() {
        let index = InterestIndex::new();
        let s = sub("1", "subscription { ping }");

        assert!(index.add(&s, true));
        assert!(index.add(&s, true));
        assert_eq!(index.bucket_len("ping"), 2);

        // Removal clears every copy.
        assert!(index.del(&s));
        assert!(!index.has(&s));
        assert!(index.is_empty());
    }

    #[test]
    fn subscription_with_many_fields_lands_in_every_bucket() {
        let index = InterestIndex::new();
        let s = sub("1", "subscription A { alpha } subscription B { beta }");
        index.add(&s, false);

        assert_eq!(index.bucket_len("alpha"), 1);
        assert_eq!(index.bucket_len("beta"), 1);
        assert_eq!(index.get(&["alpha", "beta"]).len(), 2);
    }

    #[test]
    fn repeated_field_occupies_one_slot() {
        let index = InterestIndex::new();
        let s = sub("1", "subscription A { ping } subscription B { ping }");

        assert!(index.add(&s, true));
        assert_eq!(index.bucket_len("ping"), 1);
        assert_eq!(index.get(&["ping"]).len(), 1);
    }

    #[test]
    fn subscription_without_fields_is_refused() {
        let index = InterestIndex::new();
        let s = sub("1", "subscription { ...F } fragment F on Subscription { ping }");

        assert!(!index.add(&s, true));
        assert!(!index.add(&s, false));
        assert!(index.is_empty());
    }

    #[test]
    fn del_swaps_out_only_the_target() {
        let index = InterestIndex::new();
        let a = sub("a", "subscription { ping }");
        let b = sub("b", "subscription { ping }");
        let c = sub("c", "subscription { ping }");
        for s in [&a, &b, &c] {
            index.add(s, false);
        }

        assert!(index.del(&a));
        assert!(!index.del(&a));

        let left = index.get(&["ping"]);
        assert_eq!(left.len(), 2);
        assert!(left.iter().any(|s| Arc::ptr_eq(s, &b)));
        assert!(left.iter().any(|s| Arc::ptr_eq(s, &c)));
    }

    #[test]
    fn get_handles_unknown_and_empty_names() {
        let index = InterestIndex::new();
        index.add(&sub("1", "subscription { ping }"), false);

        assert!(index.get::<&str>(&[]).is_empty());
        assert!(index.get(&["pong"]).is_empty());
        assert_eq!(index.get(&["ping", "pong"]).len(), 1);
    }

    #[test]
    fn distinct_subscriptions_with_same_id_are_distinct_entries() {
        let index = InterestIndex::new();
        let first = sub("1", "subscription { ping }");
        let second = sub("1", "subscription { ping }");
        index.add(&first, false);

        assert!(!index.has(&second));
        assert!(index.add(&second, false));
        assert_eq!(index.len(), 2);
    }
}
