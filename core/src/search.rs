//! Name scoring for symbol search.

use serde::Deserialize;
use serde::Serialize;

/// Score given to every target when the pattern is empty, and the
/// substring-mode baseline for names that do not contain the pattern.
pub const BASELINE_SCORE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub fuzzy: bool,
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            fuzzy: true,
            max_results: 100,
        }
    }
}

impl SearchOptions {
    pub const fn exact() -> Self {
        Self {
            case_sensitive: false,
            fuzzy: false,
            max_results: 100,
        }
    }

    pub const fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub const fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Score `target` against `pattern`; `None` means "not a match".
    pub fn score(&self, pattern: &str, target: &str) -> Option<f64> {
        let (pattern, target) = if self.case_sensitive {
            (pattern.to_string(), target.to_string())
        } else {
            (pattern.to_lowercase(), target.to_lowercase())
        };
        if self.fuzzy {
            fuzzy_score(&pattern, &target)
        } else {
            Some(substring_score(&pattern, &target))
        }
    }
}

/// Greedy subsequence match in one pass over `target`.
///
/// Matches only when every pattern character is consumed in order; the score
/// is matched characters over the longer of the two lengths.
pub fn fuzzy_score(pattern: &str, target: &str) -> Option<f64> {
    let pattern: Vec<char> = pattern.chars().collect();
    if pattern.is_empty() {
        return Some(BASELINE_SCORE);
    }
    let target_len = target.chars().count();
    if target_len == 0 {
        return None;
    }

    let mut matched = 0;
    for ch in target.chars() {
        if matched < pattern.len() && pattern[matched] == ch {
            matched += 1;
        }
    }

    if matched < pattern.len() {
        return None;
    }
    Some(matched as f64 / pattern.len().max(target_len) as f64)
}

/// 1.0 exact, 0.8 prefix, 0.6 contains, baseline otherwise
pub fn substring_score(pattern: &str, target: &str) -> f64 {
    if target == pattern {
        1.0
    } else if target.starts_with(pattern) {
        0.8
    } else if target.contains(pattern) {
        0.6
    } else {
        BASELINE_SCORE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn fuzzy_requires_full_subsequence() {
        let opts = SearchOptions::default();
        let get_data = opts.score("gD", "getData").unwrap();
        let get_date = opts.score("gD", "getDate").unwrap();
        assert!(close(get_data, 2.0 / 7.0));
        assert!(close(get_date, 2.0 / 7.0));
        assert_eq!(opts.score("gD", "postData"), None);
    }

    #[test]
    fn fuzzy_edge_cases() {
        assert_eq!(fuzzy_score("", "anything"), Some(BASELINE_SCORE));
        assert_eq!(fuzzy_score("", ""), Some(BASELINE_SCORE));
        assert_eq!(fuzzy_score("a", ""), None);
        assert_eq!(fuzzy_score("abc", "abc"), Some(1.0));
        // longer pattern than target can never be fully consumed
        assert_eq!(fuzzy_score("abcd", "abc"), None);
    }

    #[test]
    fn case_sensitivity_is_honoured() {
        let sensitive = SearchOptions::default().case_sensitive(true);
        assert_eq!(sensitive.score("gD", "getdata"), None);
        assert!(sensitive.score("gD", "getData").is_some());
    }

    #[test]
    fn substring_tiers() {
        let opts = SearchOptions::exact();
        assert_eq!(opts.score("user", "User"), Some(1.0));
        assert_eq!(opts.score("user", "userName"), Some(0.8));
        assert_eq!(opts.score("user", "currentUser"), Some(0.6));
        assert_eq!(opts.score("user", "account"), Some(BASELINE_SCORE));
    }
}
