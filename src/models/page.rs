//! Schedule data model shared by the client, the diff engine and the renderer.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// A start/end pair. Half-open when `T` is a date (end exclusive),
/// inclusive for lesson numbers and times of day.
#[derive(Deserialize, Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Range<T> {
    pub start: T,
    pub end: T,
}

impl<T> Range<T> {
    pub fn new(start: T, end: T) -> Self {
        Self { start, end }
    }
}

impl Range<NaiveDate> {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

impl fmt::Display for Range<NaiveTime> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// Days of the week as the upstream pages spell them.
#[derive(Deserialize, Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub fn from_date(date: NaiveDate) -> Self {
        match date.weekday() {
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
            chrono::Weekday::Sun => Weekday::Sunday,
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Weekday::Monday => "Пн",
            Weekday::Tuesday => "Вт",
            Weekday::Wednesday => "Ср",
            Weekday::Thursday => "Чт",
            Weekday::Friday => "Пт",
            Weekday::Saturday => "Сб",
            Weekday::Sunday => "Вс",
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            Weekday::Monday => "Понедельник",
            Weekday::Tuesday => "Вторник",
            Weekday::Wednesday => "Среда",
            Weekday::Thursday => "Четверг",
            Weekday::Friday => "Пятница",
            Weekday::Saturday => "Суббота",
            Weekday::Sunday => "Воскресенье",
        }
    }
}

/// Lesson format as the source pages mark it.
#[derive(Deserialize, Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Fulltime,
    Remote,
}

impl Format {
    pub fn emoji(&self) -> &'static str {
        match self {
            Format::Fulltime => "🏫",
            Format::Remote => "🖥",
        }
    }

    pub fn literal(&self) -> &'static str {
        match self {
            Format::Fulltime => "очно",
            Format::Remote => "дистанционно",
        }
    }
}

/// Which physical source documents a page was assembled from.
#[derive(Deserialize, Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RawType {
    FtWeekly,
    FtDaily,
    RWeekly,
    TchrFtWeekly,
    TchrFtDaily,
    TchrRWeekly,
}

/// Daily or weekly view of the same upstream schedule.
#[derive(Deserialize, Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Daily,
    Weekly,
}

/// A cabinet as seen from both sides: teacher and group pages may disagree
/// on the physical location, so both are carried.
#[derive(Deserialize, Debug, Serialize, Clone, Default, PartialEq, Eq, Hash)]
pub struct Cabinet {
    pub primary: Option<String>,
    pub opposite: Option<String>,
}

impl Cabinet {
    pub fn primary(primary: impl Into<String>) -> Self {
        Self {
            primary: Some(primary.into()),
            opposite: None,
        }
    }
}

/// A participant of a subject: a teacher in the group view, a group in the
/// teacher view.
#[derive(Deserialize, Debug, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct Attender {
    pub raw: String,
    pub name: String,
    pub cabinet: Cabinet,
}

#[derive(Deserialize, Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Subject {
    pub raw: String,
    pub num: u32,
    pub time: Option<Range<NaiveTime>>,
    pub name: String,
    pub format: Format,
    pub attenders: Vec<Attender>,
    pub cabinet: Option<String>,
}

impl Subject {
    /// A slot whose raw cell is filled but carries no attenders: the source
    /// marked it as busy without saying by what.
    pub fn is_unknown_window(&self) -> bool {
        !self.raw.is_empty() && self.attenders.is_empty()
    }

    /// Equality used when deciding whether two unknown windows belong to one
    /// coalesced range. The slot position and raw cell are irrelevant there.
    pub fn eq_ignoring_slot(&self, other: &Self) -> bool {
        self.name == other.name
            && self.format == other.format
            && self.attenders == other.attenders
            && self.cabinet == other.cabinet
    }
}

#[derive(Deserialize, Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Day {
    pub raw: String,
    pub weekday: Weekday,
    pub date: NaiveDate,
    pub subjects: Vec<Subject>,
}

/// A group or a teacher with its days, ordered by date.
#[derive(Deserialize, Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Formation {
    pub raw: String,
    pub name: String,
    pub days: Vec<Day>,
}

/// One snapshot of a schedule type, containing every formation's days.
#[derive(Deserialize, Debug, Serialize, Clone, PartialEq)]
pub struct Page {
    pub raw: String,
    pub raw_types: BTreeSet<RawType>,
    pub kind: PageKind,
    pub date: Range<NaiveDate>,
    pub formations: Vec<Formation>,
}

impl Page {
    pub fn formation(&self, name: &str) -> Option<&Formation> {
        self.formations.iter().find(|f| f.name == name)
    }
}
