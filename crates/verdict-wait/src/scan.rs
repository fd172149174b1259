//! One pass over a file's text.
//!
//! [`scan_text`] is pure: it maps lines, drops ignored ones and collects
//! matches for the wanted expression and the first error expression hit.
//! Waiters call it on the whole file at every poll.

use regex::{Captures, Regex};
use std::collections::BTreeMap;

use crate::mapper::{LineMapper, MapperChain};

/// A line that matched, with its capture groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    /// The line after mapping, without its terminator.
    pub line: String,
    /// 1-based line number in the unmapped file.
    pub line_number: usize,
    /// The matched text (group 0).
    pub text: String,
    pub groups: BTreeMap<String, String>,
    /// Groups by position, starting at group 1; `None` if it did not take part.
    pub positional: Vec<Option<String>>,
}

impl LineMatch {
    fn from_captures(line: &str, line_number: usize, regex: &Regex, caps: &Captures<'_>) -> Self {
        let groups = regex
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();
        let positional = caps
            .iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect();

        Self {
            line: line.to_string(),
            line_number,
            text: caps.get(0).map_or_else(String::new, |m| m.as_str().to_string()),
            groups,
            positional,
        }
    }

    /// A named group's value.
    pub fn group(&self, name: &str) -> Option<&str> {
        self.groups.get(name).map(String::as_str)
    }
}

/// What one scan found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub matches: Vec<LineMatch>,
    /// Text from the first error-expression hit to the end of its line.
    pub error_line: Option<String>,
}

/// Scans `text` line by line.
///
/// Lines go through `mappers` first; lines then containing a match for any
/// of `ignores` are skipped for both `expr` and `error_exprs`.
pub fn scan_text(
    text: &str,
    mappers: &[LineMapper],
    ignores: &[Regex],
    expr: &Regex,
    error_exprs: &[Regex],
) -> ScanResult {
    let mut chain = MapperChain::new(mappers);
    let mut result = ScanResult::default();

    for (index, raw) in text.lines().enumerate() {
        let Some(line) = chain.apply(raw) else {
            continue;
        };
        if ignores.iter().any(|re| re.is_match(&line)) {
            continue;
        }

        if let Some(caps) = expr.captures(&line) {
            result
                .matches
                .push(LineMatch::from_captures(&line, index + 1, expr, &caps));
        }

        if result.error_line.is_none() {
            if let Some(m) = error_exprs.iter().find_map(|re| re.find(&line)) {
                result.error_line = Some(line[m.start()..].trim().to_string());
            }
        }
    }

    result
}
