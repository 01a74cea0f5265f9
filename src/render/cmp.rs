//! Text rendering of a structural compare, for broadcast messages.
//!
//! Appeared entities come out as `+ repr`, disappeared as `− repr`, changed
//! as `• repr` with children indented under a dropdown glyph. Primitive
//! changes are shown as `old → new` with human field labels.

use std::fmt::Display;

use crate::models::compare::{
    AttenderCompare, DayCompare, FormationCompare, FormationTouch, PageCompare, PrimitiveChange,
    SubjectCompare,
};

const DROPDOWN: &str = "⌄";
const INDENT: &str = "   ";

/// A rendered compare. `has_detailed` tells whether any changed entry had
/// substructure, which decides whether a "details" action is offered.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedCompare {
    pub text: String,
    pub has_detailed: bool,
}

fn fmt_opt<T: Display>(value: &Option<T>) -> String {
    match value {
        Some(inner) => inner.to_string(),
        None => "—".to_string(),
    }
}

fn push_primitive<T: Display>(
    lines: &mut Vec<String>,
    depth: usize,
    label: &str,
    change: &PrimitiveChange<T>,
) {
    lines.push(format!(
        "{}{DROPDOWN} {label}: {} → {}",
        INDENT.repeat(depth),
        change.old,
        change.new
    ));
}

fn push_primitive_opt<T: Display>(
    lines: &mut Vec<String>,
    depth: usize,
    label: &str,
    change: &PrimitiveChange<Option<T>>,
) {
    lines.push(format!(
        "{}{DROPDOWN} {label}: {} → {}",
        INDENT.repeat(depth),
        fmt_opt(&change.old),
        fmt_opt(&change.new)
    ));
}

fn render_attender_cmp(cmp: &AttenderCompare, depth: usize, lines: &mut Vec<String>) {
    lines.push(format!("{}• {}", INDENT.repeat(depth), cmp.name));
    if let Some(primary) = &cmp.cabinet.primary {
        push_primitive_opt(lines, depth + 1, "кабинет", primary);
    }
    if let Some(opposite) = &cmp.cabinet.opposite {
        push_primitive_opt(lines, depth + 1, "кабинет (встречный)", opposite);
    }
}

fn render_subject_cmp(cmp: &SubjectCompare, depth: usize, lines: &mut Vec<String>) {
    lines.push(format!("{}• {}", INDENT.repeat(depth), cmp.name));
    if let Some(num) = &cmp.num {
        push_primitive(lines, depth + 1, "номер", num);
    }
    if let Some(time) = &cmp.time {
        push_primitive_opt(lines, depth + 1, "время", time);
    }
    if let Some(format) = &cmp.format {
        lines.push(format!(
            "{}{DROPDOWN} формат: {} → {}",
            INDENT.repeat(depth + 1),
            format.old.literal(),
            format.new.literal()
        ));
    }
    if let Some(cabinet) = &cmp.cabinet {
        push_primitive_opt(lines, depth + 1, "кабинет", cabinet);
    }
    for appeared in &cmp.attenders.appeared {
        lines.push(format!("{}+ {}", INDENT.repeat(depth + 1), appeared.name));
    }
    for disappeared in &cmp.attenders.disappeared {
        lines.push(format!("{}− {}", INDENT.repeat(depth + 1), disappeared.name));
    }
    for changed in &cmp.attenders.changed {
        render_attender_cmp(changed, depth + 1, lines);
    }
}

fn render_day_cmp(cmp: &DayCompare, depth: usize, lines: &mut Vec<String>) {
    lines.push(format!(
        "{}• {} ({})",
        INDENT.repeat(depth),
        cmp.date.format("%d.%m.%Y"),
        cmp.weekday.short_name()
    ));
    for appeared in &cmp.subjects.appeared {
        lines.push(format!("{}+ {}", INDENT.repeat(depth + 1), appeared.name));
    }
    for disappeared in &cmp.subjects.disappeared {
        lines.push(format!("{}− {}", INDENT.repeat(depth + 1), disappeared.name));
    }
    for changed in &cmp.subjects.changed {
        render_subject_cmp(changed, depth + 1, lines);
    }
}

fn render_formation_cmp(cmp: &FormationCompare, depth: usize, lines: &mut Vec<String>) {
    lines.push(format!("{}• {}", INDENT.repeat(depth), cmp.name));
    for appeared in &cmp.days.appeared {
        lines.push(format!(
            "{}+ {} ({})",
            INDENT.repeat(depth + 1),
            appeared.date.format("%d.%m.%Y"),
            appeared.weekday.short_name()
        ));
    }
    for disappeared in &cmp.days.disappeared {
        lines.push(format!(
            "{}− {} ({})",
            INDENT.repeat(depth + 1),
            disappeared.date.format("%d.%m.%Y"),
            disappeared.weekday.short_name()
        ));
    }
    for changed in &cmp.days.changed {
        render_day_cmp(changed, depth + 1, lines);
    }
}

/// Renders a merged list of formation compares, the unit a single
/// conversation receives.
pub fn formations(cmps: &[FormationCompare]) -> RenderedCompare {
    let mut lines = Vec::new();
    let mut has_detailed = false;
    for cmp in cmps {
        if !cmp.days.is_empty() {
            has_detailed = true;
        }
        render_formation_cmp(cmp, 0, &mut lines);
    }
    RenderedCompare {
        text: lines.join("\n"),
        has_detailed,
    }
}

/// Renders the delivery unit the broadcaster builds per conversation.
pub fn touches(touches: &[FormationTouch]) -> RenderedCompare {
    let mut lines = Vec::new();
    let mut has_detailed = false;
    for touch in touches {
        match touch {
            FormationTouch::Appeared(f) => lines.push(format!("+ {}", f.name)),
            FormationTouch::Disappeared(f) => lines.push(format!("− {}", f.name)),
            FormationTouch::Changed(cmp) => {
                if !cmp.days.is_empty() {
                    has_detailed = true;
                }
                render_formation_cmp(cmp, 0, &mut lines);
            }
        }
    }
    RenderedCompare {
        text: lines.join("\n"),
        has_detailed,
    }
}

/// Renders a whole page compare, used by the admin overview.
pub fn page(cmp: &PageCompare) -> RenderedCompare {
    let mut lines = Vec::new();
    let mut has_detailed = false;
    if let Some(date) = &cmp.date {
        lines.push(format!(
            "{DROPDOWN} даты: {}-{} → {}-{}",
            date.old.start.format("%d.%m"),
            date.old.end.format("%d.%m"),
            date.new.start.format("%d.%m"),
            date.new.end.format("%d.%m")
        ));
    }
    for appeared in &cmp.formations.appeared {
        lines.push(format!("+ {}", appeared.name));
    }
    for disappeared in &cmp.formations.disappeared {
        lines.push(format!("− {}", disappeared.name));
    }
    for changed in &cmp.formations.changed {
        if !changed.days.is_empty() {
            has_detailed = true;
        }
        render_formation_cmp(changed, 0, &mut lines);
    }
    RenderedCompare {
        text: lines.join("\n"),
        has_detailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::compare::compare_pages;
    use crate::models::page::{
        Attender, Cabinet, Day, Format, Formation, Page, PageKind, Range, RawType, Subject, Weekday,
    };
    use chrono::{NaiveDate, NaiveTime};
    use std::collections::BTreeSet;

    fn fixture() -> Page {
        Page {
            raw: String::new(),
            raw_types: BTreeSet::from([RawType::FtWeekly]),
            kind: PageKind::Weekly,
            date: Range::new(
                NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 9, 9).unwrap(),
            ),
            formations: vec![Formation {
                raw: String::new(),
                name: "1-КДД-69".to_string(),
                days: vec![Day {
                    raw: String::new(),
                    weekday: Weekday::Monday,
                    date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
                    subjects: vec![Subject {
                        raw: String::new(),
                        num: 1,
                        time: Some(Range::new(
                            NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
                            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                        )),
                        name: "Математика".to_string(),
                        format: Format::Fulltime,
                        attenders: vec![Attender {
                            raw: String::new(),
                            name: "Ебанько".to_string(),
                            cabinet: Cabinet::primary("36"),
                        }],
                        cabinet: Some("36".to_string()),
                    }],
                }],
            }],
        }
    }

    #[test]
    fn changed_cabinet_renders_old_to_new() {
        let old = fixture();
        let mut new = old.clone();
        new.formations[0].days[0].subjects[0].cabinet = Some("52".to_string());
        let cmp = compare_pages(&old, &new);
        let rendered = formations(&cmp.formations.changed);
        assert!(rendered.has_detailed);
        assert!(rendered.text.contains("• 1-КДД-69"));
        assert!(rendered.text.contains("• 02.09.2024 (Пн)"));
        assert!(rendered.text.contains("кабинет: 36 → 52"));
    }

    #[test]
    fn appeared_formation_renders_plus_without_detail() {
        let old = fixture();
        let mut new = old.clone();
        new.formations.push(Formation {
            raw: String::new(),
            name: "1-СТЗ-20".to_string(),
            days: Vec::new(),
        });
        let cmp = compare_pages(&old, &new);
        let rendered = page(&cmp);
        assert!(rendered.text.contains("+ 1-СТЗ-20"));
        assert!(!rendered.has_detailed);
    }
}
