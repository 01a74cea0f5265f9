//! Per-conversation navigation over the state forest.
//!
//! The navigator is three sequences: `trace` of visited states, `back_trace`
//! of undone states for redo, and `ignored` states that the environment
//! hides (a private chat has nothing to pin, so the pin question is
//! skipped). It imposes no transition graph; handlers author transitions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Top-level regions of the state forest.
#[derive(Deserialize, Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Space {
    Init,
    Hub,
    Settings,
    Reset,
    Zoom,
    Admin,
}

#[derive(Deserialize, Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum State {
    InitMain,
    InitMode,
    InitGroup,
    InitTeacher,
    InitBroadcast,
    InitShouldPin,
    InitFinish,
    HubMain,
    SettingsMain,
    SettingsMode,
    SettingsGroup,
    SettingsTeacher,
    SettingsBroadcast,
    SettingsShouldPin,
    ResetConfirm,
    ZoomBrowse,
    ZoomMass,
    ZoomEntry,
    ZoomEditName,
    ZoomEditUrl,
    ZoomEditId,
    ZoomEditPwd,
    ZoomEditNotes,
    ZoomDump,
    ZoomConfirmRemove,
    ZoomConfirmClear,
    AdminMain,
}

impl State {
    pub fn space(&self) -> Space {
        use State::*;
        match self {
            InitMain | InitMode | InitGroup | InitTeacher | InitBroadcast | InitShouldPin
            | InitFinish => Space::Init,
            HubMain => Space::Hub,
            SettingsMain | SettingsMode | SettingsGroup | SettingsTeacher | SettingsBroadcast
            | SettingsShouldPin => Space::Settings,
            ResetConfirm => Space::Reset,
            ZoomBrowse | ZoomMass | ZoomEntry | ZoomEditName | ZoomEditUrl | ZoomEditId
            | ZoomEditPwd | ZoomEditNotes | ZoomDump | ZoomConfirmRemove | ZoomConfirmClear => {
                Space::Zoom
            }
            AdminMain => Space::Admin,
        }
    }
}

#[derive(Deserialize, Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Navigator {
    trace: Vec<State>,
    back_trace: Vec<State>,
    ignored: BTreeSet<State>,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(State::InitMain)
    }
}

impl Navigator {
    pub fn new(root: State) -> Self {
        Self {
            trace: vec![root],
            back_trace: Vec::new(),
            ignored: BTreeSet::new(),
        }
    }

    pub fn current(&self) -> State {
        // The trace always holds at least the space root.
        *self.trace.last().unwrap()
    }

    pub fn space(&self) -> Space {
        self.current().space()
    }

    /// Pushes a state. Re-appending the state most recently undone counts as
    /// a redo; any other append discards the redo history.
    pub fn append(&mut self, state: State) {
        debug_assert!(!self.is_ignored(state));
        if self.back_trace.last() == Some(&state) {
            self.back_trace.pop();
        } else {
            self.back_trace.clear();
        }
        self.trace.push(state);
    }

    /// Steps back, remembering the undone state for `next`. No-op at the
    /// space root.
    pub fn back(&mut self) -> Option<State> {
        if self.trace.len() <= 1 {
            return None;
        }
        let undone = self.trace.pop().unwrap();
        self.back_trace.push(undone);
        Some(self.current())
    }

    /// Redoes the most recently undone state, if any.
    pub fn next(&mut self) -> Option<State> {
        let state = self.back_trace.pop()?;
        self.trace.push(state);
        Some(state)
    }

    /// Resets the trace to a single space root and discards redo history.
    pub fn clear_all(&mut self, root: State) {
        self.trace.clear();
        self.trace.push(root);
        self.back_trace.clear();
    }

    pub fn ignore(&mut self, state: State) {
        self.ignored.insert(state);
    }

    pub fn unignore(&mut self, state: State) {
        self.ignored.remove(&state);
    }

    pub fn is_ignored(&self, state: State) -> bool {
        self.ignored.contains(&state)
    }

    pub fn trace(&self) -> &[State] {
        &self.trace
    }

    pub fn back_trace(&self) -> &[State] {
        &self.back_trace
    }
}
