//! Merged, deduplicated side-effect requests.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::machine::Trigger;

/// Triggers grouped by name in first-seen order.
///
/// Adding a trigger equal to one already present is a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSet<T> {
    entries: Vec<(&'static str, Vec<T>)>,
}

impl<T> Default for TriggerSet<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Trigger> TriggerSet<T> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a trigger, returning `false` if an equal one was already present.
    pub fn add(&mut self, trigger: T) -> bool {
        let name = trigger.name();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, args)) => {
                if args.contains(&trigger) {
                    return false;
                }
                args.push(trigger);
            }
            None => self.entries.push((name, vec![trigger])),
        }
        true
    }

    /// Merges every trigger of `other` into this set.
    pub fn merge(&mut self, other: Self) {
        for (_, triggers) in other.entries {
            for trigger in triggers {
                self.add(trigger);
            }
        }
    }

    /// Returns the triggers with the given name.
    #[must_use]
    pub fn get(&self, name: &str) -> &[T] {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map_or(&[], |(_, args)| args.as_slice())
    }

    /// Iterates over trigger names in first-seen order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }

    /// Iterates over every trigger, grouped by name.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().flat_map(|(_, args)| args.iter())
    }

    /// Total number of distinct triggers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, args)| args.len()).sum()
    }

    /// Whether no trigger was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Trigger> Serialize for TriggerSet<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, args) in &self.entries {
            map.serialize_entry(name, args)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    #[serde(untagged)]
    enum Fx {
        Sync(String),
        Drop(u32),
    }

    impl Trigger for Fx {
        fn name(&self) -> &'static str {
            match self {
                Self::Sync(_) => "sync",
                Self::Drop(_) => "drop",
            }
        }
    }

    #[test]
    fn same_name_accumulates() {
        let mut set = TriggerSet::new();
        assert!(set.add(Fx::Sync("a".into())));
        assert!(set.add(Fx::Sync("b".into())));
        assert_eq!(set.get("sync"), &[Fx::Sync("a".into()), Fx::Sync("b".into())]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn duplicates_are_not_reemitted() {
        let mut set = TriggerSet::new();
        assert!(set.add(Fx::Drop(1)));
        assert!(!set.add(Fx::Drop(1)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn names_keep_first_seen_order() {
        let mut set = TriggerSet::new();
        set.add(Fx::Drop(1));
        set.add(Fx::Sync("a".into()));
        set.add(Fx::Drop(2));
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["drop", "sync"]);
    }

    #[test]
    fn merge_dedupes_across_sets() {
        let mut left = TriggerSet::new();
        left.add(Fx::Sync("a".into()));
        let mut right = TriggerSet::new();
        right.add(Fx::Sync("a".into()));
        right.add(Fx::Drop(7));
        left.merge(right);
        assert_eq!(left.len(), 2);
        assert_eq!(left.get("drop"), &[Fx::Drop(7)]);
    }

    #[test]
    fn missing_name_is_empty() {
        let set: TriggerSet<Fx> = TriggerSet::new();
        assert!(set.get("sync").is_empty());
        assert!(set.is_empty());
    }

    #[test]
    fn serializes_as_name_map() {
        let mut set = TriggerSet::new();
        set.add(Fx::Sync("a".into()));
        set.add(Fx::Drop(3));
        let json = serde_json::to_string(&set).unwrap_or_default();
        assert_eq!(json, r#"{"sync":["a"],"drop":[3]}"#);
    }
}
