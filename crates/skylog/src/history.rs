//! Linear undo/redo over whole-collection snapshots.
//!
//! [`History`] keeps the current value (`present`), a bounded stack of prior
//! values (`past`, most recent first) and the values undone since the last
//! edit (`future`, most recent first). Every [`History::apply`] invalidates
//! the redo stack.

use std::collections::VecDeque;

use tracing::trace;

/// Default number of undo steps retained.
pub const DEFAULT_CAPACITY: usize = 20;

/// Undo/redo state over snapshots of `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct History<T> {
    past: VecDeque<T>,
    present: T,
    future: VecDeque<T>,
    capacity: usize,
}

impl<T: Default> Default for History<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> History<T> {
    /// Start a history at `present` with the default capacity.
    #[must_use]
    pub fn new(present: T) -> Self {
        Self::with_capacity(present, DEFAULT_CAPACITY)
    }

    /// Start a history at `present` retaining at most `capacity` undo steps.
    #[must_use]
    pub fn with_capacity(present: T, capacity: usize) -> Self {
        Self {
            past: VecDeque::with_capacity(capacity),
            present,
            future: VecDeque::new(),
            capacity,
        }
    }

    /// The current value.
    #[must_use]
    pub fn present(&self) -> &T {
        &self.present
    }

    /// Prior values, most recent first.
    pub fn past(&self) -> impl ExactSizeIterator<Item = &T> {
        self.past.iter()
    }

    /// Undone values, most recent first.
    pub fn future(&self) -> impl ExactSizeIterator<Item = &T> {
        self.future.iter()
    }

    /// Maximum number of undo steps retained.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether [`History::undo`] would change anything.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    /// Whether [`History::redo`] would change anything.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Record a new present value.
    ///
    /// The old present moves to the front of `past`, the oldest step is
    /// dropped beyond capacity, and `future` is cleared.
    pub fn apply(&mut self, next: T) {
        let previous = std::mem::replace(&mut self.present, next);
        self.past.push_front(previous);
        self.past.truncate(self.capacity);
        self.future.clear();
        trace!(past = self.past.len(), "History applied");
    }

    /// Step back one snapshot. Returns `false` (and changes nothing) when
    /// there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.past.pop_front() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, previous);
        self.future.push_front(current);
        trace!(past = self.past.len(), future = self.future.len(), "Undo");
        true
    }

    /// Step forward one snapshot. Returns `false` (and changes nothing) when
    /// there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.future.pop_front() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, next);
        self.past.push_front(current);
        self.past.truncate(self.capacity);
        trace!(past = self.past.len(), future = self.future.len(), "Redo");
        true
    }

    /// Replace the whole state with `present` and empty stacks.
    pub fn reset(&mut self, present: T) {
        self.past.clear();
        self.future.clear();
        self.present = present;
    }
}

/// A history navigation requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    /// Step back.
    Undo,
    /// Step forward.
    Redo,
}

/// Where keyboard focus currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFocus {
    /// Focus is on the page or a non-editable control.
    #[default]
    Document,
    /// Focus is in an editable text field with its own native undo.
    TextInput,
}

/// A key press with its modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyChord {
    /// The key pressed (case-insensitive).
    pub key: char,
    /// Control held.
    pub ctrl: bool,
    /// Command/meta held.
    pub meta: bool,
    /// Shift held.
    pub shift: bool,
}

impl KeyChord {
    /// A chord with the platform "command" modifier (Ctrl or Cmd).
    #[must_use]
    pub fn command(key: char) -> Self {
        Self {
            key,
            ctrl: true,
            ..Self::default()
        }
    }

    /// The same chord with Shift held.
    #[must_use]
    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }
}

/// Map a key chord to a history action.
///
/// Ctrl/Cmd+Z undoes; Ctrl/Cmd+Shift+Z and Ctrl/Cmd+Y redo. Nothing fires
/// while a text input has focus so the field's native undo is not hijacked.
#[must_use]
pub fn shortcut_action(chord: KeyChord, focus: InputFocus) -> Option<HistoryAction> {
    if focus == InputFocus::TextInput || !(chord.ctrl || chord.meta) {
        return None;
    }
    match chord.key.to_ascii_lowercase() {
        'z' if chord.shift => Some(HistoryAction::Redo),
        'z' => Some(HistoryAction::Undo),
        'y' => Some(HistoryAction::Redo),
        _ => None,
    }
}
