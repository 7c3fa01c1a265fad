//! Key bindings: arrows or hjkl for the cursor, Enter/Space to pick and swap.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Action from a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Left,
    Right,
    Up,
    Down,
    /// Select the tile under the cursor, or swap with the selected one.
    Select,
    Hint,
    Pause,
    Restart,
    NextLevel,
    Quit,
    None,
}

/// Map key event to game action. Supports both normal (arrows, enter) and vim (hjkl).
pub fn key_to_action(key: KeyEvent) -> Action {
    let KeyEvent { code, modifiers, .. } = key;
    let no_mod = modifiers.is_empty() || modifiers == KeyModifiers::SHIFT;
    if !no_mod {
        return Action::None;
    }
    match code {
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        KeyCode::Char('p') => Action::Pause,
        KeyCode::Left | KeyCode::Char('h') => Action::Left,
        KeyCode::Right | KeyCode::Char('l') => Action::Right,
        KeyCode::Up | KeyCode::Char('k') => Action::Up,
        KeyCode::Down | KeyCode::Char('j') => Action::Down,
        KeyCode::Enter | KeyCode::Char(' ') => Action::Select,
        KeyCode::Char('?') => Action::Hint,
        KeyCode::Char('r') => Action::Restart,
        KeyCode::Char('n') => Action::NextLevel,
        _ => Action::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn arrows_and_vim_keys_agree() {
        assert_eq!(key_to_action(key(KeyCode::Left)), Action::Left);
        assert_eq!(key_to_action(key(KeyCode::Char('h'))), Action::Left);
        assert_eq!(key_to_action(key(KeyCode::Down)), Action::Down);
        assert_eq!(key_to_action(key(KeyCode::Char('j'))), Action::Down);
    }

    #[test]
    fn select_and_commands() {
        assert_eq!(key_to_action(key(KeyCode::Enter)), Action::Select);
        assert_eq!(key_to_action(key(KeyCode::Char(' '))), Action::Select);
        assert_eq!(key_to_action(key(KeyCode::Esc)), Action::Quit);
        assert_eq!(
            key_to_action(KeyEvent::new(KeyCode::Char('?'), KeyModifiers::SHIFT)),
            Action::Hint
        );
    }

    #[test]
    fn control_chords_are_ignored() {
        let ctrl_r = KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL);
        assert_eq!(key_to_action(ctrl_r), Action::None);
    }
}
