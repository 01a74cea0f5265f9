//! Structural compare of two schedule pages.
//!
//! The compare reproduces the shape of a [`Page`]: at every level entities
//! are matched by their repr key (name for formations, subjects and
//! attenders, date for days) and sorted into appeared, disappeared and
//! changed buckets. Equal values never produce a change entry, so diffing a
//! page against itself yields an empty compare.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::page::{Attender, Cabinet, Day, Format, Formation, Page, Range, Subject, Weekday};

/// An old/new pair, emitted only when the two differ.
#[derive(Deserialize, Debug, Serialize, Clone, PartialEq)]
pub struct PrimitiveChange<T> {
    pub old: T,
    pub new: T,
}

fn primitive<T: PartialEq + Clone>(old: &T, new: &T) -> Option<PrimitiveChange<T>> {
    if old == new {
        None
    } else {
        Some(PrimitiveChange {
            old: old.clone(),
            new: new.clone(),
        })
    }
}

/// Appeared/disappeared/changed buckets for one level of the tree.
#[derive(Deserialize, Debug, Serialize, Clone, PartialEq)]
pub struct Changes<T, C> {
    pub appeared: Vec<T>,
    pub disappeared: Vec<T>,
    pub changed: Vec<C>,
}

impl<T, C> Default for Changes<T, C> {
    fn default() -> Self {
        Self {
            appeared: Vec::new(),
            disappeared: Vec::new(),
            changed: Vec::new(),
        }
    }
}

impl<T, C> Changes<T, C> {
    pub fn is_empty(&self) -> bool {
        self.appeared.is_empty() && self.disappeared.is_empty() && self.changed.is_empty()
    }
}

/// Matches `old` and `new` by key, preserving input order. Duplicate keys
/// pair first-unmatched to first-unmatched. `diff` decides whether a matched
/// pair counts as changed; changed entries follow new-side order.
fn split<T, K, C>(
    old: &[T],
    new: &[T],
    key: impl Fn(&T) -> K,
    diff: impl Fn(&T, &T) -> Option<C>,
) -> Changes<T, C>
where
    T: Clone,
    K: PartialEq,
{
    let mut out = Changes::default();
    let mut used = vec![false; old.len()];

    for new_item in new {
        let matched = old
            .iter()
            .enumerate()
            .find(|(i, old_item)| !used[*i] && key(old_item) == key(new_item));
        match matched {
            Some((i, old_item)) => {
                used[i] = true;
                if let Some(change) = diff(old_item, new_item) {
                    out.changed.push(change);
                }
            }
            None => out.appeared.push(new_item.clone()),
        }
    }

    for (i, old_item) in old.iter().enumerate() {
        if !used[i] {
            out.disappeared.push(old_item.clone());
        }
    }

    out
}

#[derive(Deserialize, Debug, Serialize, Clone, Default, PartialEq)]
pub struct CabinetCompare {
    pub primary: Option<PrimitiveChange<Option<String>>>,
    pub opposite: Option<PrimitiveChange<Option<String>>>,
}

impl CabinetCompare {
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.opposite.is_none()
    }
}

fn compare_cabinets(old: &Cabinet, new: &Cabinet) -> CabinetCompare {
    CabinetCompare {
        primary: primitive(&old.primary, &new.primary),
        opposite: primitive(&old.opposite, &new.opposite),
    }
}

#[derive(Deserialize, Debug, Serialize, Clone, PartialEq)]
pub struct AttenderCompare {
    pub name: String,
    pub cabinet: CabinetCompare,
}

fn compare_attenders(old: &Attender, new: &Attender) -> Option<AttenderCompare> {
    let cabinet = compare_cabinets(&old.cabinet, &new.cabinet);
    if cabinet.is_empty() {
        None
    } else {
        Some(AttenderCompare {
            name: new.name.clone(),
            cabinet,
        })
    }
}

#[derive(Deserialize, Debug, Serialize, Clone, PartialEq)]
pub struct SubjectCompare {
    pub name: String,
    pub num: Option<PrimitiveChange<u32>>,
    pub time: Option<PrimitiveChange<Option<Range<NaiveTime>>>>,
    pub format: Option<PrimitiveChange<Format>>,
    pub cabinet: Option<PrimitiveChange<Option<String>>>,
    pub attenders: Changes<Attender, AttenderCompare>,
}

impl SubjectCompare {
    pub fn is_empty(&self) -> bool {
        self.num.is_none()
            && self.time.is_none()
            && self.format.is_none()
            && self.cabinet.is_none()
            && self.attenders.is_empty()
    }
}

fn compare_subjects(old: &Subject, new: &Subject) -> Option<SubjectCompare> {
    let cmp = SubjectCompare {
        name: new.name.clone(),
        num: primitive(&old.num, &new.num),
        time: primitive(&old.time, &new.time),
        format: primitive(&old.format, &new.format),
        cabinet: primitive(&old.cabinet, &new.cabinet),
        attenders: split(
            &old.attenders,
            &new.attenders,
            |a| a.name.clone(),
            compare_attenders,
        ),
    };
    if cmp.is_empty() {
        None
    } else {
        Some(cmp)
    }
}

#[derive(Deserialize, Debug, Serialize, Clone, PartialEq)]
pub struct DayCompare {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub subjects: Changes<Subject, SubjectCompare>,
}

impl DayCompare {
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

fn compare_days(old: &Day, new: &Day) -> Option<DayCompare> {
    let cmp = DayCompare {
        date: new.date,
        weekday: new.weekday,
        subjects: split(
            &old.subjects,
            &new.subjects,
            |s| s.name.clone(),
            compare_subjects,
        ),
    };
    if cmp.is_empty() {
        None
    } else {
        Some(cmp)
    }
}

#[derive(Deserialize, Debug, Serialize, Clone, PartialEq)]
pub struct FormationCompare {
    pub name: String,
    pub days: Changes<Day, DayCompare>,
}

impl FormationCompare {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

fn compare_formations(old: &Formation, new: &Formation) -> Option<FormationCompare> {
    let cmp = FormationCompare {
        name: new.name.clone(),
        days: split(&old.days, &new.days, |d| d.date, compare_days),
    };
    if cmp.is_empty() {
        None
    } else {
        Some(cmp)
    }
}

#[derive(Deserialize, Debug, Serialize, Clone, PartialEq)]
pub struct PageCompare {
    pub date: Option<PrimitiveChange<Range<NaiveDate>>>,
    pub formations: Changes<Formation, FormationCompare>,
}

impl PageCompare {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.formations.is_empty()
    }

    /// Repr names of every formation touched by this compare, in bucket
    /// order: appeared, changed, disappeared.
    pub fn touched_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        names.extend(self.formations.appeared.iter().map(|f| f.name.as_str()));
        names.extend(self.formations.changed.iter().map(|c| c.name.as_str()));
        names.extend(self.formations.disappeared.iter().map(|f| f.name.as_str()));
        names
    }
}

/// One formation's part of a page compare, the unit a subscriber receives.
#[derive(Deserialize, Debug, Serialize, Clone, PartialEq)]
pub enum FormationTouch {
    Appeared(Formation),
    Disappeared(Formation),
    Changed(FormationCompare),
}

impl FormationTouch {
    pub fn name(&self) -> &str {
        match self {
            FormationTouch::Appeared(f) | FormationTouch::Disappeared(f) => &f.name,
            FormationTouch::Changed(c) => &c.name,
        }
    }
}

impl PageCompare {
    /// Flattens the formation buckets into per-formation touches, appeared
    /// first, then changed, then disappeared, each in input order.
    pub fn touches(&self) -> Vec<FormationTouch> {
        let mut out = Vec::new();
        for f in &self.formations.appeared {
            out.push(FormationTouch::Appeared(f.clone()));
        }
        for c in &self.formations.changed {
            out.push(FormationTouch::Changed(c.clone()));
        }
        for f in &self.formations.disappeared {
            out.push(FormationTouch::Disappeared(f.clone()));
        }
        out
    }
}

/// Compares two snapshots of the same page kind.
pub fn compare_pages(old: &Page, new: &Page) -> PageCompare {
    PageCompare {
        date: primitive(&old.date, &new.date),
        formations: split(
            &old.formations,
            &new.formations,
            |f| f.name.clone(),
            compare_formations,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::page::{PageKind, RawType};
    use std::collections::BTreeSet;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, day).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn subject(num: u32, name: &str, attender: &str) -> Subject {
        Subject {
            raw: format!("{num}. {name}"),
            num,
            time: Some(Range::new(time(8 + num, 0), time(9 + num, 30))),
            name: name.to_string(),
            format: Format::Fulltime,
            attenders: vec![Attender {
                raw: attender.to_string(),
                name: attender.to_string(),
                cabinet: Cabinet::primary("36"),
            }],
            cabinet: Some("36".to_string()),
        }
    }

    fn page(formations: Vec<Formation>) -> Page {
        Page {
            raw: String::new(),
            raw_types: BTreeSet::from([RawType::FtWeekly]),
            kind: PageKind::Weekly,
            date: Range::new(date(2), date(9)),
            formations,
        }
    }

    fn formation(name: &str, subjects: Vec<Subject>) -> Formation {
        Formation {
            raw: name.to_string(),
            name: name.to_string(),
            days: vec![Day {
                raw: String::new(),
                weekday: Weekday::Monday,
                date: date(2),
                subjects,
            }],
        }
    }

    #[test]
    fn page_compared_to_itself_is_empty() {
        let page = page(vec![formation(
            "1-КДД-69",
            vec![subject(1, "Психология общения", "Хомченко")],
        )]);
        assert!(compare_pages(&page, &page).is_empty());
    }

    #[test]
    fn appeared_and_disappeared_are_symmetric() {
        let old = page(vec![formation("1-КДД-69", vec![])]);
        let new = page(vec![
            formation("1-КДД-69", vec![]),
            formation("1-СТЗ-20", vec![]),
            formation("3-ВЕБ-11", vec![]),
        ]);
        let forward = compare_pages(&old, &new);
        let backward = compare_pages(&new, &old);
        assert_eq!(
            forward.formations.appeared.len(),
            backward.formations.disappeared.len()
        );
        assert_eq!(forward.formations.appeared.len(), 2);
        assert!(forward.formations.changed.is_empty());
    }

    #[test]
    fn equal_fields_produce_no_primitive_change() {
        let old = page(vec![formation(
            "1-КДД-69",
            vec![subject(1, "Психология общения", "Хомченко")],
        )]);
        let mut new = old.clone();
        new.formations[0].days[0].subjects[0].cabinet = Some("52".to_string());
        let cmp = compare_pages(&old, &new);

        let fcmp = &cmp.formations.changed[0];
        let dcmp = &fcmp.days.changed[0];
        let scmp = &dcmp.subjects.changed[0];
        assert!(scmp.num.is_none());
        assert!(scmp.time.is_none());
        assert_eq!(
            scmp.cabinet,
            Some(PrimitiveChange {
                old: Some("36".to_string()),
                new: Some("52".to_string()),
            })
        );
    }

    #[test]
    fn changed_follows_new_side_order() {
        let old = page(vec![
            formation("1-КДД-69", vec![subject(1, "Математика", "Ебанько")]),
            formation("1-СТЗ-20", vec![subject(1, "Физика", "Хомченко")]),
        ]);
        let mut new = old.clone();
        new.formations.swap(0, 1);
        new.formations[0].days[0].subjects[0].cabinet = Some("1".to_string());
        new.formations[1].days[0].subjects[0].cabinet = Some("2".to_string());
        let cmp = compare_pages(&old, &new);
        let names: Vec<_> = cmp.formations.changed.iter().map(|c| &c.name).collect();
        assert_eq!(names, ["1-СТЗ-20", "1-КДД-69"]);
    }

    #[test]
    fn attender_cabinet_sides_tracked_independently() {
        let old = page(vec![formation(
            "1-КДД-69",
            vec![subject(1, "Математика", "Ебанько")],
        )]);
        let mut new = old.clone();
        new.formations[0].days[0].subjects[0].attenders[0]
            .cabinet
            .opposite = Some("107".to_string());
        let cmp = compare_pages(&old, &new);
        let acmp = &cmp.formations.changed[0].days.changed[0].subjects.changed[0]
            .attenders
            .changed[0];
        assert!(acmp.cabinet.primary.is_none());
        assert_eq!(
            acmp.cabinet.opposite,
            Some(PrimitiveChange {
                old: None,
                new: Some("107".to_string()),
            })
        );
    }

    #[test]
    fn rerun_is_idempotent() {
        let old = page(vec![formation(
            "1-КДД-69",
            vec![subject(1, "Математика", "Ебанько")],
        )]);
        let mut new = old.clone();
        new.formations[0].days[0].subjects[0].num = 2;
        assert_eq!(compare_pages(&old, &new), compare_pages(&old, &new));
    }
}
