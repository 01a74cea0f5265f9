//! Maps schedule identifiers to the conversations that follow them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::bot::ctx::{ConvKey, Ctx, Mode};
use crate::models::compare::{FormationTouch, PageCompare};

/// In-memory index of broadcast opt-ins. Rebuilt from contexts on startup
/// and kept in sync by the dispatcher after every event.
#[derive(Debug, Default)]
pub struct SubscriberIndex {
    groups: HashMap<String, BTreeSet<ConvKey>>,
    teachers: HashMap<String, BTreeSet<ConvKey>>,
}

impl SubscriberIndex {
    fn bucket(&mut self, kind: Mode) -> &mut HashMap<String, BTreeSet<ConvKey>> {
        match kind {
            Mode::Group => &mut self.groups,
            Mode::Teacher => &mut self.teachers,
        }
    }

    pub fn subscribe(&mut self, key: ConvKey, identifier: &str, kind: Mode) {
        self.bucket(kind)
            .entry(identifier.to_string())
            .or_default()
            .insert(key);
    }

    /// Drops the conversation from every bucket.
    pub fn unsubscribe(&mut self, key: ConvKey) {
        for bucket in self.groups.values_mut().chain(self.teachers.values_mut()) {
            bucket.remove(&key);
        }
        self.groups.retain(|_, set| !set.is_empty());
        self.teachers.retain(|_, set| !set.is_empty());
    }

    /// Brings the index in line with one conversation's current settings.
    pub fn sync(&mut self, ctx: &Ctx) {
        self.unsubscribe(ctx.key);
        if ctx.is_subscribed() {
            if let (Some(mode), Some(identifier)) = (ctx.mode, ctx.identifier.as_deref()) {
                self.subscribe(ctx.key, identifier, mode);
            }
        }
    }

    pub fn subscribers_for(&self, identifier: &str, kind: Mode) -> BTreeSet<ConvKey> {
        let bucket = match kind {
            Mode::Group => &self.groups,
            Mode::Teacher => &self.teachers,
        };
        bucket.get(identifier).cloned().unwrap_or_default()
    }

    /// Conversations touched by a page compare, with the formation touches
    /// each should hear about. Identifiers nobody follows are skipped. Both
    /// group and teacher buckets are consulted; a page carries one kind of
    /// formation, but the index does not need to know which.
    pub fn affected_by(&self, cmp: &PageCompare) -> BTreeMap<ConvKey, Vec<FormationTouch>> {
        let mut out: BTreeMap<ConvKey, Vec<FormationTouch>> = BTreeMap::new();
        for touch in cmp.touches() {
            let name = touch.name();
            let subscribers = self
                .groups
                .get(name)
                .into_iter()
                .chain(self.teachers.get(name))
                .flatten();
            for key in subscribers {
                out.entry(*key).or_default().push(touch.clone());
            }
        }
        out
    }

    /// Merges per-conversation touch lists from the daily and weekly
    /// compares into one delivery unit each, dropping exact duplicates.
    pub fn merge_affected(
        mut daily: BTreeMap<ConvKey, Vec<FormationTouch>>,
        weekly: BTreeMap<ConvKey, Vec<FormationTouch>>,
    ) -> BTreeMap<ConvKey, Vec<FormationTouch>> {
        for (key, touches) in weekly {
            let unit = daily.entry(key).or_default();
            for touch in touches {
                if !unit.contains(&touch) {
                    unit.push(touch);
                }
            }
        }
        daily
    }

    pub fn len(&self) -> usize {
        self.groups.values().chain(self.teachers.values()).map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
