//! Text rendering of schedule pages for one identifier.
//!
//! A day is rendered subject by subject with three embellishments:
//! numbering gaps become visible window rows, runs of identical
//! unknown-window slots are coalesced into a single circled-digit range, and
//! a flip of the lesson format opens a new emoji sub-header.

pub mod cmp;

use chrono::NaiveDate;

use crate::models::page::{Attender, Day, Format, Formation, Page, Subject, Weekday};
use crate::zoom::ZoomEntries;

const WINDOW_ROW: &str = "🕳 Окно";
const INDENT: &str = "   ";

/// Keycap digits for standalone lesson numbers.
fn keycap(num: u32) -> String {
    match num {
        1..=9 => format!("{}\u{fe0f}\u{20e3}", num),
        10 => "🔟".to_string(),
        other => format!("{other}."),
    }
}

/// Negative circled digits for coalesced ranges.
fn circled(num: u32) -> String {
    const DIGITS: [&str; 10] = ["➊", "➋", "➌", "➍", "➎", "➏", "➐", "➑", "➒", "➓"];
    match num {
        1..=10 => DIGITS[(num - 1) as usize].to_string(),
        other => format!("{other}."),
    }
}

fn day_header(weekday: Weekday, format: Format, date: NaiveDate) -> String {
    format!(
        "{} | {} ({}) {}:",
        format.emoji(),
        weekday.full_name(),
        format.literal(),
        date.format("%d.%m.%Y")
    )
}

fn render_attender(attender: &Attender, format: Format, zoom: &ZoomEntries) -> String {
    let mut out = attender.name.clone();
    if let Some(cab) = &attender.cabinet.primary {
        out.push_str(&format!(" ({cab})"));
    }
    if let Some(entry) = zoom.fuzzy_match(&attender.name) {
        let extra = match format {
            Format::Remote => entry.text_full().replace('\n', ", "),
            Format::Fulltime => entry
                .text_notes()
                .map(|notes| notes.replace('\n', ", "))
                .unwrap_or_default(),
        };
        if !extra.is_empty() {
            out.push_str(&format!(" [{extra}]"));
        }
    }
    out
}

fn render_subject(subject: &Subject, zoom: &ZoomEntries) -> String {
    let mut out = keycap(subject.num);
    if let Some(time) = &subject.time {
        out.push_str(&format!(" {time}"));
    }
    out.push_str(&format!(": {}", subject.name));
    if !subject.attenders.is_empty() {
        let attenders = subject
            .attenders
            .iter()
            .map(|a| render_attender(a, subject.format, zoom))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(" {attenders}"));
    }
    if let Some(cabinet) = &subject.cabinet {
        out.push_str(&format!(" (каб. {cabinet})"));
    }
    out
}

/// Emits the held run of unknown windows as contiguous numeric ranges.
/// Grouping only joins slots where `prev.num + 1 == curr.num`.
fn flush_hold(hold: &[&Subject], lines: &mut Vec<String>, last_num: &mut Option<u32>) {
    let mut run_start = 0;
    for i in 0..hold.len() {
        let run_ends = i + 1 == hold.len() || hold[i].num + 1 != hold[i + 1].num;
        if !run_ends {
            continue;
        }
        let first = hold[run_start];
        let last = hold[i];
        push_window_marker(first.num, lines, last_num);
        if run_start == i {
            lines.push(format!("{INDENT}{}: {}", keycap(first.num), first.name));
        } else {
            let time = match (&first.time, &last.time) {
                (Some(a), Some(b)) => format!(
                    " {}-{}",
                    a.start.format("%H:%M"),
                    b.end.format("%H:%M")
                ),
                _ => String::new(),
            };
            lines.push(format!(
                "{INDENT}{}-{}{}: {}",
                circled(first.num),
                circled(last.num),
                time,
                first.name
            ));
        }
        *last_num = Some(last.num);
        run_start = i + 1;
    }
}

fn push_window_marker(num: u32, lines: &mut Vec<String>, last_num: &Option<u32>) {
    if let Some(last) = last_num {
        if num != *last && num != *last + 1 {
            lines.push(format!("{INDENT}{WINDOW_ROW}"));
        }
    }
}

/// Renders one day. The hold buffer gathers uniform unknown-window slots so
/// they come out as one coalesced row.
pub fn render_day(day: &Day, zoom: &ZoomEntries) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut hold: Vec<&Subject> = Vec::new();
    let mut last_num: Option<u32> = None;
    let mut block_format: Option<Format> = None;

    for subject in &day.subjects {
        if subject.is_unknown_window()
            && hold
                .last()
                .map_or(true, |held| held.eq_ignoring_slot(subject))
        {
            hold.push(subject);
            continue;
        }
        flush_hold(&hold, &mut lines, &mut last_num);
        hold.clear();
        if subject.is_unknown_window() {
            hold.push(subject);
            continue;
        }

        if block_format != Some(subject.format) {
            lines.push(day_header(day.weekday, subject.format, day.date));
            block_format = Some(subject.format);
        }
        push_window_marker(subject.num, &mut lines, &last_num);
        lines.push(format!("{INDENT}{}", render_subject(subject, zoom)));
        last_num = Some(subject.num);
    }
    flush_hold(&hold, &mut lines, &mut last_num);

    // A day of nothing but unknown windows never opened a header.
    if !lines.is_empty() && !lines[0].contains('|') {
        lines.insert(
            0,
            day_header(
                day.weekday,
                day.subjects.first().map(|s| s.format).unwrap_or(Format::Fulltime),
                day.date,
            ),
        );
    }

    lines.join("\n")
}

pub fn render_formation(formation: &Formation, zoom: &ZoomEntries) -> String {
    let mut blocks = vec![format!("📋 {}", formation.name)];
    for day in &formation.days {
        let rendered = render_day(day, zoom);
        if !rendered.is_empty() {
            blocks.push(rendered);
        }
    }
    blocks.join("\n\n")
}

/// A folded view: day headers with lesson counts, no subject rows.
pub fn render_formation_folded(formation: &Formation) -> String {
    let mut lines = vec![format!("📋 {} (свернуто)", formation.name)];
    for day in &formation.days {
        let count = day.subjects.iter().filter(|s| !s.is_unknown_window()).count();
        let format = day
            .subjects
            .first()
            .map(|s| s.format)
            .unwrap_or(Format::Fulltime);
        lines.push(format!(
            "{} {} ({}) — {} пар(ы)",
            format.emoji(),
            day.weekday.short_name(),
            day.date.format("%d.%m"),
            count
        ));
    }
    lines.join("\n")
}

/// Renders the page for one identifier, or `None` when the page does not
/// mention it.
pub fn render_page(page: &Page, identifier: &str, zoom: &ZoomEntries, folded: bool) -> Option<String> {
    let formation = page.formation(identifier)?;
    Some(if folded {
        render_formation_folded(formation)
    } else {
        render_formation(formation, zoom)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::page::{Cabinet, Range};
    use chrono::{NaiveDate, NaiveTime};

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn subject(num: u32, name: &str, attender: Option<&str>) -> Subject {
        Subject {
            raw: format!("{num}. {name}"),
            num,
            time: Some(Range::new(
                time(7 + num, 30),
                time(9 + num, 0),
            )),
            name: name.to_string(),
            format: Format::Fulltime,
            attenders: attender
                .map(|a| {
                    vec![Attender {
                        raw: a.to_string(),
                        name: a.to_string(),
                        cabinet: Cabinet::default(),
                    }]
                })
                .unwrap_or_default(),
            cabinet: None,
        }
    }

    fn day(subjects: Vec<Subject>) -> Day {
        Day {
            raw: String::new(),
            weekday: Weekday::Monday,
            date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
            subjects,
        }
    }

    fn nums_of(rendered: &str) -> Vec<u32> {
        rendered
            .lines()
            .filter_map(|line| {
                let trimmed = line.trim_start();
                let first = trimmed.chars().next()?;
                first.to_digit(10)
            })
            .collect()
    }

    #[test]
    fn gap_in_numbering_emits_one_window_row() {
        let day = day(vec![
            subject(1, "Математика", Some("Ебанько")),
            subject(2, "Физика", Some("Хомченко")),
            subject(4, "Химия", Some("Ебанько")),
        ]);
        let rendered = render_day(&day, &ZoomEntries::default());
        assert_eq!(rendered.matches(WINDOW_ROW).count(), 1);
        let window_line = rendered.lines().position(|l| l.contains(WINDOW_ROW)).unwrap();
        assert!(rendered.lines().nth(window_line - 1).unwrap().contains("Физика"));
        assert!(rendered.lines().nth(window_line + 1).unwrap().contains("Химия"));
    }

    #[test]
    fn emitted_nums_are_non_decreasing() {
        let day = day(vec![
            subject(1, "Математика", Some("Ебанько")),
            subject(3, "Физика", Some("Хомченко")),
            subject(4, "Химия", Some("Ебанько")),
            subject(6, "История", Some("Хомченко")),
        ]);
        let rendered = render_day(&day, &ZoomEntries::default());
        let nums = nums_of(&rendered);
        assert!(nums.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(rendered.matches(WINDOW_ROW).count(), 2);
    }

    #[test]
    fn uniform_unknown_windows_coalesce_into_one_range() {
        let mut slots = Vec::new();
        for num in 2..=4 {
            let mut s = subject(num, "занято", None);
            s.raw = "занято".to_string();
            slots.push(s);
        }
        let day = day(slots);
        let rendered = render_day(&day, &ZoomEntries::default());
        assert!(rendered.contains("➋-➍ 09:30-13:00: занято"), "{rendered}");
    }

    #[test]
    fn format_flip_opens_sub_header() {
        let mut remote = subject(3, "Информатика", Some("Ебанько"));
        remote.format = Format::Remote;
        let day = day(vec![
            subject(1, "Математика", Some("Ебанько")),
            subject(2, "Физика", Some("Хомченко")),
            remote,
        ]);
        let rendered = render_day(&day, &ZoomEntries::default());
        assert!(rendered.contains("🏫 | Понедельник (очно) 02.09.2024:"));
        assert!(rendered.contains("🖥 | Понедельник (дистанционно) 02.09.2024:"));
    }

    #[test]
    fn zoom_entry_rendered_by_format() {
        use crate::zoom::ZoomEntry;
        let mut zoom = ZoomEntries::default();
        let mut entry = ZoomEntry::named("Ебанько Х.Й.");
        entry.url = Some("https://zoom.us/j/420".to_string());
        entry.notes = Some("стучать дважды".to_string());
        zoom.add(entry).unwrap();

        let fulltime = subject(1, "Математика", Some("Ебанько"));
        let mut remote = subject(1, "Математика", Some("Ебанько"));
        remote.format = Format::Remote;

        let ft = render_subject(&fulltime, &zoom);
        assert!(ft.contains("Заметки: стучать дважды"));
        assert!(!ft.contains("zoom.us"));

        let rm = render_subject(&remote, &zoom);
        assert!(rm.contains("Ссылка: https://zoom.us/j/420"));
        assert!(rm.contains("Заметки: стучать дважды"));
    }

    #[test]
    fn keycap_and_circled_digits() {
        assert_eq!(keycap(1), "1\u{fe0f}\u{20e3}");
        assert_eq!(keycap(10), "🔟");
        assert_eq!(circled(2), "➋");
        assert_eq!(circled(11), "11.");
    }
}
