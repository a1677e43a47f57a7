//! Unified diff of a patched file against its backup.

use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::fmt::Write;
use std::path::Path;

/// Render the changed lines between `original` and `patched`, with three
/// lines of context. Returns an empty string when nothing changed.
pub fn render(file: &Path, original: &str, patched: &str) -> String {
    let mut out = String::new();
    if original == patched {
        return out;
    }

    let diff = TextDiff::from_lines(original, patched);

    let _ = writeln!(out, "{}", format!("--- {} (original)", file.display()).dimmed());
    let _ = writeln!(out, "{}", format!("+++ {} (patched)", file.display()).dimmed());

    for group in diff.grouped_ops(3) {
        for op in group {
            for change in diff.iter_changes(&op) {
                let line = match change.tag() {
                    ChangeTag::Delete => format!("-{}", change).red(),
                    ChangeTag::Insert => format!("+{}", change).green(),
                    ChangeTag::Equal => format!(" {}", change).normal(),
                };
                let _ = write!(out, "{}", line);
                if change.missing_newline() {
                    out.push('\n');
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_marks_changed_line() {
        colored::control::set_override(false);
        let out = render(Path::new("a.py"), "x = 1\ny = 2\n", "x = 9\ny = 2\n");
        assert!(out.contains("--- a.py (original)"));
        assert!(out.contains("-x = 1\n"));
        assert!(out.contains("+x = 9\n"));
        assert!(out.contains(" y = 2\n"));
    }

    #[test]
    fn test_render_unchanged_is_empty() {
        assert!(render(Path::new("a.py"), "x = 1\n", "x = 1\n").is_empty());
    }
}
