//! Keyboard voting path
//!
//! Arrow keys pick a side, Enter/Space submit, Escape leaves focus mode.
//! A resolved submit goes through the same `submit_vote` as a click.

use crate::types::Choice;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    Enter,
    Space,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Focus(Choice),
    Submit(Choice),
    ExitFocus,
    Ignored,
}

/// Per-connection keyboard state
#[derive(Debug, Clone)]
pub struct KeyboardNavigator {
    selected: Choice,
    focus_mode: bool,
}

impl Default for KeyboardNavigator {
    fn default() -> Self {
        Self {
            selected: Choice::Pull,
            focus_mode: false,
        }
    }
}

impl KeyboardNavigator {
    pub fn selected(&self) -> Choice {
        self.selected
    }

    pub fn in_focus_mode(&self) -> bool {
        self.focus_mode
    }

    /// `can_vote` is false outside voting or once the participant has voted
    pub fn handle(&mut self, key: Key, can_vote: bool) -> KeyAction {
        match key {
            Key::Escape => {
                self.focus_mode = false;
                KeyAction::ExitFocus
            }
            _ if !can_vote => KeyAction::Ignored,
            Key::ArrowLeft => self.focus(Choice::Pull),
            Key::ArrowRight => self.focus(Choice::DontPull),
            Key::Enter | Key::Space if self.focus_mode => KeyAction::Submit(self.selected),
            Key::Enter | Key::Space => KeyAction::Ignored,
        }
    }

    fn focus(&mut self, choice: Choice) -> KeyAction {
        self.selected = choice;
        self.focus_mode = true;
        KeyAction::Focus(choice)
    }

    /// Forget the selection when a new round starts
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
