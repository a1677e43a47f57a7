//! Thread-local cache of compiled assignment patterns.
//!
//! A sweep edits the same variables once per strategy, so the pattern for a
//! given variable name is compiled once and reused for every later line.
//! Cache is capped at 256 entries; it is cleared when full.

use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;

const MAX_CACHE_ENTRIES: usize = 256;

thread_local! {
    static ASSIGNMENT_CACHE: RefCell<HashMap<String, Regex>> =
        RefCell::new(HashMap::new());
}

/// Pattern source for an assignment to `variable`.
///
/// Group 1 is the variable name up to and including `=`, group 2 is the raw
/// value area, which stops at the first `)`, `,`, `;` or line end.
fn assignment_source(variable: &str) -> String {
    format!(r"({}\s*=)([^),;\r\n]*)", regex::escape(variable))
}

/// Get the compiled assignment pattern for `variable`, compiling and caching
/// it on first use.
pub fn assignment_pattern(variable: &str) -> Result<Regex, regex::Error> {
    ASSIGNMENT_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();

        if let Some(re) = cache.get(variable) {
            return Ok(re.clone());
        }

        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = Regex::new(&assignment_source(variable))?;
        cache.insert(variable.to_string(), compiled.clone());
        Ok(compiled)
    })
}

/// Clear the pattern cache (mainly for testing).
pub fn clear_cache() {
    ASSIGNMENT_CACHE.with(|cache| {
        cache.borrow_mut().clear();
    });
}

/// Number of cached patterns on the current thread.
pub fn cache_size() -> usize {
    ASSIGNMENT_CACHE.with(|cache| cache.borrow().len())
}
