//! Line-level assignment patching.
//!
//! A directive names a variable and a new value; the patcher finds the
//! left-most `NAME =` on the line, takes everything after the `=` up to the
//! first `)`, `,`, `;` or line end as the value area, strips whitespace and
//! quotes from it, and swaps the value. Every byte outside the matched
//! assignment clause is left untouched.
//!
//! Patching is split into three steps behind [`LinePatcher`] so the final
//! rewrite can be swapped without touching callers:
//!
//! 1. [`LinePatcher::locate_assignment`] finds the clause and its value area.
//! 2. [`LinePatcher::extract_value`] narrows the value area to the bare value.
//! 3. [`LinePatcher::rewrite`] produces the edited line.
//!
//! There is no understanding of the target language: `MAX_X = 3` is a valid
//! assignment to `X`, and a `,` inside a string literal ends the value.

use crate::cache::assignment_pattern;
use std::ops::Range;
use thiserror::Error;

const QUOTES: &[char] = &['"', '\''];

#[derive(Error, Debug)]
pub enum LineError {
    #[error("variable `{variable}` could not be found in line")]
    VariableNotFound { variable: String },

    #[error("`{variable}` occurs in line but is never assigned with `=`")]
    NoAssignment { variable: String },

    #[error("invalid assignment pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Byte ranges of one assignment clause within a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// `NAME = value` up to, not including, the first delimiter
    pub clause: Range<usize>,
    /// Everything between `=` and the delimiter, whitespace and quotes included
    pub value_area: Range<usize>,
}

/// A pluggable strategy for rewriting a variable's value on one line.
pub trait LinePatcher {
    /// Find the left-most assignment to `variable`.
    ///
    /// Fails with [`LineError::VariableNotFound`] if `variable` does not occur
    /// anywhere in `line`.
    fn locate_assignment(&self, line: &str, variable: &str) -> Result<Assignment, LineError> {
        if !line.contains(variable) {
            return Err(LineError::VariableNotFound {
                variable: variable.to_string(),
            });
        }

        let pattern = assignment_pattern(variable)?;
        let no_assignment = || LineError::NoAssignment {
            variable: variable.to_string(),
        };
        let caps = pattern.captures(line).ok_or_else(no_assignment)?;
        let (Some(clause), Some(value_area)) = (caps.get(0), caps.get(2)) else {
            return Err(no_assignment());
        };

        Ok(Assignment {
            clause: clause.range(),
            value_area: value_area.range(),
        })
    }

    /// Narrow the value area to the bare value: leading whitespace and
    /// quotes, then trailing whitespace and quotes, are excluded.
    fn extract_value(&self, line: &str, assignment: &Assignment) -> Range<usize> {
        let area = &line[assignment.value_area.clone()];

        let after_ws = area.trim_start();
        let after_quotes = after_ws.trim_start_matches(QUOTES);
        let value = after_quotes.trim_end().trim_end_matches(QUOTES);

        if value.is_empty() {
            // Only quotes left: the empty value sits between them.
            let quotes = after_ws.trim_end();
            let at = assignment.value_area.end - after_ws.len() + quotes.len() / 2;
            return at..at;
        }

        let start = assignment.value_area.end - after_quotes.len();
        start..start + value.len()
    }

    /// Produce the edited line given the located clause and value.
    fn rewrite(
        &self,
        line: &str,
        assignment: &Assignment,
        value: Range<usize>,
        new_value: &str,
    ) -> String;

    /// Locate, extract and rewrite in one step.
    fn edit(&self, line: &str, variable: &str, new_value: &str) -> Result<String, LineError> {
        let assignment = self.locate_assignment(line, variable)?;
        let value = self.extract_value(line, &assignment);
        Ok(self.rewrite(line, &assignment, value, new_value))
    }
}

/// Replaces every occurrence of the old value's text inside the clause.
///
/// This is the historical behaviour and the default. When the old value text
/// also appears elsewhere in the clause (`X1 = 1`), those occurrences are
/// replaced too; use [`SpanPatcher`] to replace by position instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralPatcher;

impl LinePatcher for LiteralPatcher {
    fn rewrite(
        &self,
        line: &str,
        assignment: &Assignment,
        value: Range<usize>,
        new_value: &str,
    ) -> String {
        let clause = &line[assignment.clause.clone()];
        let old = &line[value.clone()];

        // An empty old value has no text to search for; fall back to its position.
        let edited = if old.is_empty() {
            let at = value.start - assignment.clause.start;
            format!("{}{}{}", &clause[..at], new_value, &clause[at..])
        } else {
            clause.replace(old, new_value)
        };

        splice(line, assignment.clause.clone(), &edited)
    }
}

/// Replaces exactly the extracted value span.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanPatcher;

impl LinePatcher for SpanPatcher {
    fn rewrite(
        &self,
        line: &str,
        _assignment: &Assignment,
        value: Range<usize>,
        new_value: &str,
    ) -> String {
        splice(line, value, new_value)
    }
}

/// Read the current value of `variable` on `line`.
pub fn current_value<'a>(
    patcher: &dyn LinePatcher,
    line: &'a str,
    variable: &str,
) -> Result<&'a str, LineError> {
    let assignment = patcher.locate_assignment(line, variable)?;
    Ok(&line[patcher.extract_value(line, &assignment)])
}

fn splice(line: &str, range: Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(line.len() + replacement.len());
    out.push_str(&line[..range.start]);
    out.push_str(replacement);
    out.push_str(&line[range.end..]);
    out
}
