use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use serde_json::from_str;

use crate::language::Language;

static CORPUS_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/corpus");

/// An immutable piece of source code to be typed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub language: Language,
    pub code: String,
}

impl Snippet {
    pub fn new(language: Language, code: impl Into<String>) -> Self {
        Self {
            language,
            code: code.into(),
        }
    }

    pub fn char_len(&self) -> usize {
        self.code.chars().count()
    }
}

/// Source of snippets per language
pub trait SnippetRepository {
    fn get(&self, language: Language) -> Vec<Snippet>;
}

/// Snippets compiled into the binary from `src/corpus/<language>.json`
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedSnippets;

impl SnippetRepository for EmbeddedSnippets {
    fn get(&self, language: Language) -> Vec<Snippet> {
        match read_corpus_file(language) {
            Some(codes) => codes
                .into_iter()
                .filter(|c| !c.is_empty())
                .map(|c| Snippet::new(language, c))
                .collect(),
            None => Vec::new(),
        }
    }
}

fn read_corpus_file(language: Language) -> Option<Vec<String>> {
    let file_name = format!("{language}.json");
    let Some(file) = CORPUS_DIR.get_file(&file_name) else {
        tracing::warn!(file = %file_name, "snippet corpus file missing");
        return None;
    };
    let contents = file.contents_utf8()?;
    match from_str::<Vec<String>>(contents) {
        Ok(codes) => Some(codes),
        Err(e) => {
            tracing::warn!(file = %file_name, error = %e, "snippet corpus file unreadable");
            None
        }
    }
}

/// Random snippet for `language`, falling back to the built-in one when the
/// repository has nothing for it.
pub fn pick(repo: &dyn SnippetRepository, language: Language) -> Snippet {
    let snippets = repo.get(language);
    let mut rng = rand::thread_rng();
    snippets
        .choose(&mut rng)
        .cloned()
        .unwrap_or_else(|| fallback(language))
}

/// Like [`pick`] but avoids handing back `current` when there is a choice.
pub fn pick_other(repo: &dyn SnippetRepository, language: Language, current: &str) -> Snippet {
    let snippets: Vec<Snippet> = repo
        .get(language)
        .into_iter()
        .filter(|s| s.code != current)
        .collect();
    let mut rng = rand::thread_rng();
    match snippets.choose(&mut rng) {
        Some(s) => s.clone(),
        None => pick(repo, language),
    }
}

pub fn fallback(language: Language) -> Snippet {
    let code = match language {
        Language::Python => {
            "def fibonacci(n):\n    if n <= 1:\n        return n\n    return fibonacci(n-1) + fibonacci(n-2)\n\nfor i in range(10):\n    print(f\"F({i}) = {fibonacci(i)}\")"
        }
        Language::Javascript => {
            "function quickSort(arr) {\n    if (arr.length <= 1) return arr;\n    const pivot = arr[Math.floor(arr.length / 2)];\n    const left = [], right = [], equal = [];\n\n    for (let element of arr) {\n        if (element < pivot) left.push(element);\n        else if (element > pivot) right.push(element);\n        else equal.push(element);\n    }\n\n    return [...quickSort(left), ...equal, ...quickSort(right)];\n}"
        }
        Language::Cpp => {
            "int binarySearch(vector<int>& arr, int target) {\n    int left = 0, right = arr.size() - 1;\n\n    while (left <= right) {\n        int mid = left + (right - left) / 2;\n        if (arr[mid] == target) return mid;\n        else if (arr[mid] < target) left = mid + 1;\n        else right = mid - 1;\n    }\n\n    return -1;\n}"
        }
        Language::Go => {
            "func mergeSort(arr []int) []int {\n    if len(arr) <= 1 {\n        return arr\n    }\n\n    mid := len(arr) / 2\n    left := mergeSort(arr[:mid])\n    right := mergeSort(arr[mid:])\n\n    return merge(left, right)\n}"
        }
        Language::Rust => {
            "fn binary_search<T: Ord>(arr: &[T], target: &T) -> Option<usize> {\n    let mut left = 0;\n    let mut right = arr.len();\n\n    while left < right {\n        let mid = left + (right - left) / 2;\n        match arr[mid].cmp(target) {\n            std::cmp::Ordering::Equal => return Some(mid),\n            std::cmp::Ordering::Less => left = mid + 1,\n            std::cmp::Ordering::Greater => right = mid,\n        }\n    }\n\n    None\n}"
        }
        Language::Scala => {
            "def quickSort[T](arr: List[T])(implicit ord: Ordering[T]): List[T] = {\n  import ord._\n\n  arr match {\n    case Nil => Nil\n    case head :: tail =>\n      val (smaller, larger) = tail.partition(_ < head)\n      quickSort(smaller) ::: head :: quickSort(larger)\n  }\n}"
        }
        Language::C => {
            "void bubbleSort(int arr[], int n) {\n    for (int i = 0; i < n-1; i++) {\n        for (int j = 0; j < n-i-1; j++) {\n            if (arr[j] > arr[j+1]) {\n                int temp = arr[j];\n                arr[j] = arr[j+1];\n                arr[j+1] = temp;\n            }\n        }\n    }\n}"
        }
    };
    Snippet::new(language, code)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyRepo;

    impl SnippetRepository for EmptyRepo {
        fn get(&self, _language: Language) -> Vec<Snippet> {
            Vec::new()
        }
    }

    #[test]
    fn test_embedded_corpus_covers_every_language() {
        for lang in Language::ALL {
            let snippets = EmbeddedSnippets.get(lang);
            assert!(!snippets.is_empty(), "no snippets for {lang}");
            assert!(snippets.iter().all(|s| s.language == lang));
        }
    }

    #[test]
    fn test_pick_returns_snippet_of_language() {
        let snippet = pick(&EmbeddedSnippets, Language::Go);
        assert_eq!(snippet.language, Language::Go);
        assert!(EmbeddedSnippets
            .get(Language::Go)
            .iter()
            .any(|s| s.code == snippet.code));
    }

    #[test]
    fn test_pick_falls_back_when_repository_empty() {
        let snippet = pick(&EmptyRepo, Language::Scala);
        assert_eq!(snippet, fallback(Language::Scala));
        assert!(snippet.code.contains("quickSort"));
    }

    #[test]
    fn test_pick_other_avoids_current_when_possible() {
        let current = pick(&EmbeddedSnippets, Language::Rust);
        for _ in 0..20 {
            let next = pick_other(&EmbeddedSnippets, Language::Rust, &current.code);
            assert_ne!(next.code, current.code);
        }
    }

    #[test]
    fn test_go_corpus_keeps_literal_tabs() {
        let snippets = EmbeddedSnippets.get(Language::Go);
        assert!(snippets.iter().any(|s| s.code.contains('\t')));
    }

    #[test]
    fn test_char_len_counts_scalars() {
        assert_eq!(Snippet::new(Language::C, "a\tb").char_len(), 3);
    }
}
