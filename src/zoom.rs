//! Per-conversation catalog of Zoom entries attached to attender names.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use similar::TextDiff;

use crate::error::ZoomError;

/// Names match when at least this similar. Entries are usually stored with
/// initials ("Ебанько Х.Й.") while pages carry bare surnames ("Ебанько"),
/// so the surname token is tried as well.
pub const MATCH_THRESHOLD: f32 = 0.8;

#[derive(Deserialize, Debug, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ZoomEntry {
    pub name: String,
    pub url: Option<String>,
    pub id: Option<String>,
    pub pwd: Option<String>,
    pub notes: Option<String>,
}

impl ZoomEntry {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Every stored field, for the remote format.
    pub fn text_full(&self) -> String {
        let mut lines = Vec::new();
        if let Some(url) = &self.url {
            lines.push(format!("Ссылка: {url}"));
        }
        if let Some(id) = &self.id {
            lines.push(format!("ID: {id}"));
        }
        if let Some(pwd) = &self.pwd {
            lines.push(format!("Пароль: {pwd}"));
        }
        if let Some(notes) = &self.notes {
            lines.push(format!("Заметки: {notes}"));
        }
        lines.join("\n")
    }

    /// Notes only, for the fulltime format where the link is irrelevant.
    pub fn text_notes(&self) -> Option<String> {
        self.notes.as_ref().map(|notes| format!("Заметки: {notes}"))
    }
}

fn similarity(a: &str, b: &str) -> f32 {
    let (a, b) = (a.to_lowercase(), b.to_lowercase());
    TextDiff::from_chars(a.as_str(), b.as_str()).ratio()
}

/// Entries keyed by exact name. Name uniqueness is the container invariant.
#[derive(Deserialize, Debug, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ZoomEntries {
    entries: BTreeMap<String, ZoomEntry>,
}

impl ZoomEntries {
    pub fn add(&mut self, entry: ZoomEntry) -> Result<(), ZoomError> {
        if self.entries.contains_key(&entry.name) {
            return Err(ZoomError::NameInDatabase);
        }
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Inserts or overwrites, for mass additions where clobbering is wanted.
    pub fn put(&mut self, entry: ZoomEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn remove(&mut self, name: &str) -> Result<ZoomEntry, ZoomError> {
        self.entries.remove(name).ok_or(ZoomError::NameNotInDatabase)
    }

    /// Renames an entry, keeping name uniqueness.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), ZoomError> {
        if from != to && self.entries.contains_key(to) {
            return Err(ZoomError::NameInDatabase);
        }
        let mut entry = self.remove(from)?;
        entry.name = to.to_string();
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ZoomEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ZoomEntry> {
        self.entries.get_mut(name)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZoomEntry> {
        self.entries.values()
    }

    /// Best fuzzy match for an attender name. The whole entry name and its
    /// surname token both count; the best score wins and must reach the
    /// threshold.
    pub fn fuzzy_match(&self, attender_name: &str) -> Option<&ZoomEntry> {
        let mut best: Option<(f32, &ZoomEntry)> = None;
        for entry in self.entries.values() {
            let whole = similarity(&entry.name, attender_name);
            let surname = entry
                .name
                .split_whitespace()
                .next()
                .map(|token| similarity(token, attender_name))
                .unwrap_or(0.0);
            let score = whole.max(surname);
            if score >= MATCH_THRESHOLD && best.map_or(true, |(b, _)| score > b) {
                best = Some((score, entry));
            }
        }
        best.map(|(_, entry)| entry)
    }

    /// Serialized dump of every entry, suitable for re-import elsewhere.
    pub fn dump(&self) -> String {
        self.entries
            .values()
            .map(|entry| {
                let body = entry.text_full();
                if body.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{}\n{}", entry.name, body)
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_rejects_duplicate_name() {
        let mut entries = ZoomEntries::default();
        entries.add(ZoomEntry::named("Ебанько Х.Й.")).unwrap();
        assert_eq!(
            entries.add(ZoomEntry::named("Ебанько Х.Й.")),
            Err(ZoomError::NameInDatabase)
        );
    }

    #[test]
    fn remove_unknown_name_fails() {
        let mut entries = ZoomEntries::default();
        assert_eq!(
            entries.remove("Хомченко").unwrap_err(),
            ZoomError::NameNotInDatabase
        );
    }

    #[test]
    fn fuzzy_match_finds_surname_with_initials() {
        let mut entries = ZoomEntries::default();
        entries.add(ZoomEntry::named("Ебанько Х.Й.")).unwrap();
        entries.add(ZoomEntry::named("Хомченко А.А.")).unwrap();
        let hit = entries.fuzzy_match("Ебанько").unwrap();
        assert_eq!(hit.name, "Ебанько Х.Й.");
        assert!(entries.fuzzy_match("Петров").is_none());
    }

    #[test]
    fn rename_keeps_uniqueness() {
        let mut entries = ZoomEntries::default();
        entries.add(ZoomEntry::named("Ебанько Х.Й.")).unwrap();
        entries.add(ZoomEntry::named("Хомченко А.А.")).unwrap();
        assert_eq!(
            entries.rename("Ебанько Х.Й.", "Хомченко А.А."),
            Err(ZoomError::NameInDatabase)
        );
        entries.rename("Ебанько Х.Й.", "Ебанько Х.И.").unwrap();
        assert!(entries.get("Ебанько Х.И.").is_some());
        assert!(entries.get("Ебанько Х.Й.").is_none());
    }

    #[test]
    fn dump_lists_every_entry() {
        let mut entries = ZoomEntries::default();
        let mut entry = ZoomEntry::named("Ебанько Х.Й.");
        entry.url = Some("https://zoom.us/j/420".to_string());
        entries.add(entry).unwrap();
        entries.add(ZoomEntry::named("Хомченко А.А.")).unwrap();
        let dump = entries.dump();
        assert!(dump.contains("Ебанько Х.Й.\nСсылка: https://zoom.us/j/420"));
        assert!(dump.contains("Хомченко А.А."));
    }
}
