//! Persisted per-conversation state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::navigator::Navigator;
use crate::models::page::PageKind;
use crate::zoom::ZoomEntries;

/// On-disk Ctx schema. Bump on incompatible layout changes.
pub const CTX_SCHEMA: u32 = 1;

#[derive(Deserialize, Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Vk,
    Telegram,
}

impl Platform {
    pub fn prefix(&self) -> &'static str {
        match self {
            Platform::Vk => "vk",
            Platform::Telegram => "tg",
        }
    }
}

/// One user or group chat on one messenger platform.
#[derive(Deserialize, Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConvKey {
    pub platform: Platform,
    pub peer_id: i64,
}

impl ConvKey {
    pub fn new(platform: Platform, peer_id: i64) -> Self {
        Self { platform, peer_id }
    }

    /// Stable stem for the per-conversation state file.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.platform.prefix(), self.peer_id)
    }

    /// Whether this is a one-on-one chat. Telegram groups carry negative
    /// ids; VK multichats start at 2'000'000'000.
    pub fn is_private(&self) -> bool {
        match self.platform {
            Platform::Telegram => self.peer_id > 0,
            Platform::Vk => self.peer_id < 2_000_000_000,
        }
    }
}

/// Whether the conversation follows a group or a teacher.
#[derive(Deserialize, Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Group,
    Teacher,
}

/// The schedule message currently shown in the conversation.
#[derive(Deserialize, Debug, Serialize, Clone, Default, PartialEq)]
pub struct ScheduleMessage {
    pub id: Option<i64>,
    pub kind: Option<PageKind>,
    pub is_folded: bool,
}

#[derive(Deserialize, Debug, Serialize, Clone, Default, PartialEq)]
pub struct ScheduleState {
    pub message: ScheduleMessage,
    pub last_update: Option<DateTime<Utc>>,
    pub temp_group: Option<String>,
    pub temp_teacher: Option<String>,
    pub temp_mode: Option<Mode>,
}

#[derive(Deserialize, Debug, Serialize, Clone, PartialEq)]
pub struct Settings {
    pub broadcast: bool,
    pub should_pin: bool,
    pub zoom: ZoomEntries,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broadcast: true,
            should_pin: false,
            zoom: ZoomEntries::default(),
        }
    }
}

/// Zoom browse pagination.
#[derive(Deserialize, Debug, Serialize, Clone, Default, PartialEq)]
pub struct Pagination {
    pub page: usize,
}

/// The full persisted state of one conversation.
#[derive(Deserialize, Debug, Serialize, Clone, PartialEq)]
pub struct Ctx {
    pub schema: u32,
    pub key: ConvKey,
    pub mode: Option<Mode>,
    pub identifier: Option<String>,
    pub schedule: ScheduleState,
    pub settings: Settings,
    pub navigator: Navigator,
    pub pagination: Pagination,
    /// Name of the Zoom entry currently opened in the catalog.
    pub zoom_selected: Option<String>,
}

impl Ctx {
    pub fn new(key: ConvKey) -> Self {
        Self {
            schema: CTX_SCHEMA,
            key,
            mode: None,
            identifier: None,
            schedule: ScheduleState::default(),
            settings: Settings::default(),
            navigator: Navigator::default(),
            pagination: Pagination::default(),
            zoom_selected: None,
        }
    }

    /// A conversation takes part in broadcasts once it confirmed an
    /// identifier and kept the broadcast switch on.
    pub fn is_subscribed(&self) -> bool {
        self.settings.broadcast && self.identifier.is_some() && self.mode.is_some()
    }
}
