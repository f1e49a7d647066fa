/// Classification of a single target position against the typed buffer
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum CharClass {
    Correct,
    Incorrect,
    /// the next character to type
    Current,
    Untyped,
}

/// Per-position view of the target plus the number of mismatches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub classes: Vec<CharClass>,
    pub error_count: usize,
}

impl Diff {
    pub fn count(&self, class: CharClass) -> usize {
        self.classes.iter().filter(|c| **c == class).count()
    }
}

/// Compare `typed` against `target` position by position.
///
/// Characters typed past the end of the target have no position to land on
/// and are ignored.
pub fn diff(target: &str, typed: &str) -> Diff {
    let mut classes = Vec::with_capacity(target.len());
    let mut error_count = 0;
    let mut typed_chars = typed.chars();
    let mut reached_cursor = false;

    for expected in target.chars() {
        if reached_cursor {
            classes.push(CharClass::Untyped);
            continue;
        }
        match typed_chars.next() {
            Some(c) if c == expected => classes.push(CharClass::Correct),
            Some(_) => {
                error_count += 1;
                classes.push(CharClass::Incorrect);
            }
            None => {
                reached_cursor = true;
                classes.push(CharClass::Current);
            }
        }
    }

    Diff {
        classes,
        error_count,
    }
}

/// Mismatch count only, without building the classification.
pub fn count_errors(target: &str, typed: &str) -> usize {
    typed
        .chars()
        .zip(target.chars())
        .filter(|(t, e)| t != e)
        .count()
}

pub fn is_complete(target: &str, typed: &str) -> bool {
    target == typed
}

#[cfg(test)]
mod tests {
    use super::*;
    use CharClass::{Correct, Current, Incorrect, Untyped};

    #[test]
    fn test_single_mismatch_at_end() {
        let d = diff("abc", "abd");
        assert_eq!(d.classes, vec![Correct, Correct, Incorrect]);
        assert_eq!(d.error_count, 1);
    }

    #[test]
    fn test_partial_input_marks_current_then_untyped() {
        let d = diff("hello", "he");
        assert_eq!(d.classes, vec![Correct, Correct, Current, Untyped, Untyped]);
        assert_eq!(d.error_count, 0);
    }

    #[test]
    fn test_empty_input() {
        let d = diff("ab", "");
        assert_eq!(d.classes, vec![Current, Untyped]);
        assert_eq!(d.error_count, 0);
    }

    #[test]
    fn test_empty_target() {
        let d = diff("", "x");
        assert!(d.classes.is_empty());
        assert_eq!(d.error_count, 0);
    }

    #[test]
    fn test_overflow_is_ignored() {
        let d = diff("ab", "abzz");
        assert_eq!(d.classes, vec![Correct, Correct]);
        assert_eq!(d.error_count, 0);
        assert_eq!(count_errors("ab", "abzz"), 0);
    }

    #[test]
    fn test_tab_is_an_ordinary_character() {
        let d = diff("\tx", " x");
        assert_eq!(d.classes, vec![Incorrect, Correct]);
        assert!(is_complete("\tx", "\tx"));
        assert!(!is_complete("\tx", "    x"));
    }

    #[test]
    fn test_multibyte_characters_are_single_positions() {
        let d = diff("→a", "→b");
        assert_eq!(d.classes, vec![Correct, Incorrect]);
    }

    #[test]
    fn test_class_counts_sum_to_target_length() {
        let target = "fn main() {\n\tprintln!(\"hi\");\n}";
        let target_len = target.chars().count();
        let samples = [
            "",
            "f",
            "fn main",
            "fx maim() {",
            "fn main() {\n    println",
            target,
        ];
        for typed in samples {
            let d = diff(target, typed);
            let sum = d.count(Correct) + d.count(Incorrect) + d.count(Current) + d.count(Untyped);
            assert_eq!(sum, target_len, "typed {typed:?}");
            assert_eq!(d.error_count, d.count(Incorrect));
            assert_eq!(d.error_count, count_errors(target, typed));
        }
    }

    #[test]
    fn test_completion_requires_exact_match() {
        assert!(is_complete("a b", "a b"));
        assert!(!is_complete("a b", "a b "));
        assert!(!is_complete("a b", "a"));
    }
}
