use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// How a key press changes the input buffer of a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    Insert(char),
    Backspace,
}

/// Map a key to a buffer edit. Tab and Enter insert literally so whitespace
/// in the snippet has to be typed exactly.
pub fn edit_for(key: &KeyEvent) -> Option<Edit> {
    if key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
        return None;
    }
    match key.code {
        KeyCode::Char(c) => Some(Edit::Insert(c)),
        KeyCode::Tab => Some(Edit::Insert('\t')),
        KeyCode::Enter => Some(Edit::Insert('\n')),
        KeyCode::Backspace => Some(Edit::Backspace),
        _ => None,
    }
}

/// Apply `edit` to a copy of `buffer`.
pub fn apply_edit(buffer: &str, edit: Edit) -> String {
    let mut next = buffer.to_string();
    match edit {
        Edit::Insert(c) => next.push(c),
        Edit::Backspace => {
            next.pop();
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_tab_and_enter_insert_literally() {
        assert_eq!(edit_for(&key(KeyCode::Tab)), Some(Edit::Insert('\t')));
        assert_eq!(edit_for(&key(KeyCode::Enter)), Some(Edit::Insert('\n')));
    }

    #[test]
    fn test_control_chords_are_not_input() {
        let ev = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(edit_for(&ev), None);
    }

    #[test]
    fn test_shifted_chars_are_input() {
        let ev = KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT);
        assert_eq!(edit_for(&ev), Some(Edit::Insert('A')));
    }

    #[test]
    fn test_navigation_keys_ignored() {
        assert_eq!(edit_for(&key(KeyCode::Left)), None);
        assert_eq!(edit_for(&key(KeyCode::Esc)), None);
    }

    #[test]
    fn test_apply_edit() {
        assert_eq!(apply_edit("ab", Edit::Insert('\t')), "ab\t");
        assert_eq!(apply_edit("ab", Edit::Backspace), "a");
        assert_eq!(apply_edit("", Edit::Backspace), "");
        assert_eq!(apply_edit("→", Edit::Backspace), "");
    }
}
