//! Line transforms applied before a file is searched.
//!
//! Each mapper either rewrites a line or drops it. Mappers run in order and
//! a dropped line is not seen by later mappers. `IncludeLinesBetween` is
//! stateful; its state lives in a [`MapperChain`] created fresh for every
//! scan, so the same mapper list can be reused across polls and threads.

use regex::Regex;
use std::fmt;
use std::sync::Arc;
use verdict_common::{Error, Result};

type LineFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Clone)]
pub enum LineMapper {
    /// Replaces every match of `pattern` (`$1`, `$name` expand groups).
    RegexReplace { pattern: Regex, replacement: String },
    /// Keeps only lines that match at their start.
    IncludeLinesMatching(Regex),
    /// Drops lines that match at their start.
    ExcludeLinesMatching(Regex),
    /// Keeps lines inside ranges.
    ///
    /// Without `start_at`, lines are kept from the top of the file. A line
    /// matching `stop_after` is kept and ends the range; a line matching
    /// `stop_before` ends the range and is dropped. A later `start_at` line
    /// opens a new range.
    IncludeLinesBetween {
        start_at: Option<Regex>,
        stop_after: Option<Regex>,
        stop_before: Option<Regex>,
    },
    /// Arbitrary transform; `None` drops the line.
    Custom(LineFn),
}

impl LineMapper {
    pub fn regex_replace(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        Ok(LineMapper::RegexReplace {
            pattern: compile(pattern)?,
            replacement: replacement.into(),
        })
    }

    pub fn include_lines_matching(pattern: &str) -> Result<Self> {
        Ok(LineMapper::IncludeLinesMatching(compile_anchored(pattern)?))
    }

    pub fn exclude_lines_matching(pattern: &str) -> Result<Self> {
        Ok(LineMapper::ExcludeLinesMatching(compile_anchored(pattern)?))
    }

    pub fn include_lines_between(
        start_at: Option<&str>,
        stop_after: Option<&str>,
        stop_before: Option<&str>,
    ) -> Result<Self> {
        Ok(LineMapper::IncludeLinesBetween {
            start_at: start_at.map(compile).transpose()?,
            stop_after: stop_after.map(compile).transpose()?,
            stop_before: stop_before.map(compile).transpose()?,
        })
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        LineMapper::Custom(Arc::new(f))
    }
}

impl fmt::Debug for LineMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineMapper::RegexReplace { pattern, replacement } => {
                write!(f, "RegexReplace({}, {})", pattern, replacement)
            }
            LineMapper::IncludeLinesMatching(re) => write!(f, "IncludeLinesMatching({})", re),
            LineMapper::ExcludeLinesMatching(re) => write!(f, "ExcludeLinesMatching({})", re),
            LineMapper::IncludeLinesBetween {
                start_at,
                stop_after,
                stop_before,
            } => write!(
                f,
                "IncludeLinesBetween(start_at={:?}, stop_after={:?}, stop_before={:?})",
                start_at.as_ref().map(Regex::as_str),
                stop_after.as_ref().map(Regex::as_str),
                stop_before.as_ref().map(Regex::as_str)
            ),
            LineMapper::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

pub(crate) fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::validation(format!("Invalid regular expression {:?}: {}", pattern, e)))
}

/// Compiles a pattern that must match at the start of a line.
fn compile_anchored(pattern: &str) -> Result<Regex> {
    compile(&format!("^(?:{})", pattern))
}

/// The mappers of one scan together with their per-scan state.
pub(crate) struct MapperChain<'a> {
    mappers: &'a [LineMapper],
    including: Vec<bool>,
}

impl<'a> MapperChain<'a> {
    pub(crate) fn new(mappers: &'a [LineMapper]) -> Self {
        let including = mappers
            .iter()
            .map(|m| match m {
                LineMapper::IncludeLinesBetween { start_at, .. } => start_at.is_none(),
                _ => true,
            })
            .collect();
        Self { mappers, including }
    }

    /// Runs `line` through every mapper; `None` if any of them drops it.
    pub(crate) fn apply(&mut self, line: &str) -> Option<String> {
        let mappers = self.mappers;
        let mut current = line.to_string();
        for (index, mapper) in mappers.iter().enumerate() {
            current = match mapper {
                LineMapper::RegexReplace { pattern, replacement } => {
                    pattern.replace_all(&current, replacement.as_str()).into_owned()
                }
                LineMapper::IncludeLinesMatching(re) => {
                    if !re.is_match(&current) {
                        return None;
                    }
                    current
                }
                LineMapper::ExcludeLinesMatching(re) => {
                    if re.is_match(&current) {
                        return None;
                    }
                    current
                }
                LineMapper::IncludeLinesBetween {
                    start_at,
                    stop_after,
                    stop_before,
                } => {
                    let including = &mut self.including[index];
                    if *including {
                        if stop_before.as_ref().is_some_and(|re| re.is_match(&current)) {
                            *including = false;
                            return None;
                        }
                        if stop_after.as_ref().is_some_and(|re| re.is_match(&current)) {
                            *including = false;
                        }
                        current
                    } else if start_at.as_ref().is_some_and(|re| re.is_match(&current)) {
                        *including = true;
                        current
                    } else {
                        return None;
                    }
                }
                LineMapper::Custom(f) => f(&current)?,
            };
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(mappers: &[LineMapper], input: &str) -> String {
        let mut chain = MapperChain::new(mappers);
        input
            .split(',')
            .filter_map(|line| chain.apply(line))
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn test_regex_replace() {
        let mapper = LineMapper::regex_replace(r"id=\d+", "id=<n>").unwrap();
        assert_eq!(run(&[mapper], "a id=12 b id=7"), "a id=<n> b id=<n>");
    }

    #[test]
    fn test_include_and_exclude_are_anchored() {
        let include = LineMapper::include_lines_matching("Foo").unwrap();
        assert_eq!(run(&[include], "Foo bar,bar Foo"), "Foo bar");

        let exclude = LineMapper::exclude_lines_matching("bar").unwrap();
        assert_eq!(run(&[exclude], "Foo bar,bar Foo"), "Foo bar");
    }

    #[test]
    fn test_include_lines_between() {
        let mapper = LineMapper::include_lines_between(Some("start.*"), Some("stopafter.*"), None).unwrap();
        assert_eq!(
            run(&[mapper], "a,start line,b,c,stopafter line,d,start line2,e"),
            "start line,b,c,stopafter line,start line2,e"
        );

        let mapper = LineMapper::include_lines_between(None, Some("stopafter"), None).unwrap();
        assert_eq!(run(&[mapper], "a,stopafter,b,c"), "a,stopafter");

        let mapper = LineMapper::include_lines_between(None, None, Some("stopbefore")).unwrap();
        assert_eq!(run(&[mapper], "a,b,stopbefore,c"), "a,b");
    }

    #[test]
    fn test_state_is_per_chain() {
        let mappers = vec![LineMapper::include_lines_between(Some("begin"), None, Some("end")).unwrap()];
        assert_eq!(run(&mappers, "x,begin,y,end,z"), "begin,y");
        assert_eq!(run(&mappers, "begin,q"), "begin,q");
    }

    #[test]
    fn test_custom_and_ordering() {
        let mappers = vec![
            LineMapper::custom(|line| Some(line.to_uppercase())),
            LineMapper::exclude_lines_matching("SKIP").unwrap(),
        ];
        assert_eq!(run(&mappers, "keep,skip me"), "KEEP");
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(LineMapper::regex_replace("(unclosed", "").is_err());
    }
}
