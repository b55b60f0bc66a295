//! Search-pattern matching for directory listings.
//!
//! Supports `*` and `?`, case-insensitive; `*` and `*.*` both match every
//! name, matching what Windows callers expect from FindFiles.

/// Returns `true` when `name` matches `pattern`.
pub fn matches(pattern: &str, name: &str) -> bool {
    if pattern.is_empty() || pattern == "*" || pattern == "*.*" {
        return true;
    }
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();
    matches_at(&pattern, &name)
}

fn matches_at(pattern: &[char], name: &[char]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some((&'*', rest)) => {
            // A star swallows zero or more characters.
            (0..=name.len()).any(|skip| matches_at(rest, &name[skip..]))
        }
        Some((&'?', rest)) => !name.is_empty() && matches_at(rest, &name[1..]),
        Some((ch, rest)) => name.first() == Some(ch) && matches_at(rest, &name[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_and_star_dot_star_match_everything() {
        for name in ["a.txt", "noext", "", ".hidden"] {
            assert!(matches("*", name), "{name}");
            assert!(matches("*.*", name), "{name}");
        }
    }

    #[test]
    fn literal_names_match_case_insensitively() {
        assert!(matches("Report.TXT", "report.txt"));
        assert!(!matches("report.txt", "report.bin"));
    }

    #[test]
    fn star_matches_runs() {
        assert!(matches("*.txt", "notes.txt"));
        assert!(matches("data*", "data_2024.bin"));
        assert!(matches("*2024*", "backup-2024-06.tar"));
        assert!(!matches("*.txt", "notes.txt.bak"));
    }

    #[test]
    fn question_mark_matches_single_character() {
        assert!(matches("file?.dat", "file1.dat"));
        assert!(!matches("file?.dat", "file12.dat"));
        assert!(!matches("file?.dat", "file.dat"));
    }

    #[test]
    fn mixed_wildcards() {
        assert!(matches("?ile*.d??", "file_v2.dat"));
        assert!(!matches("?ile*.d??", "file_v2.txt"));
    }

    #[test]
    fn empty_pattern_matches_everything() {
        assert!(matches("", "anything"));
    }
}
