//! String transforms available to every annotation pipeline.

use regex::Regex;
use thiserror::Error;

use crate::error::BoxError;
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("regexp did not match the content")]
pub struct NoRegexpMatch;

pub(crate) fn register(registry: &mut Registry) {
    registry
        .register_transform("regexp", regexp)
        .register_transform("strip", strip)
        .register_transform("prepend", |text: &str, affix: &str| {
            Ok::<_, BoxError>(prepend(text, affix))
        })
        .register_transform("append", |text: &str, affix: &str| {
            Ok::<_, BoxError>(append(text, affix))
        })
        .register_transform("path.prepend", |text: &str, affix: &str| {
            Ok::<_, BoxError>(path_prepend(text, affix))
        })
        .register_transform("path.append", |text: &str, affix: &str| {
            Ok::<_, BoxError>(path_append(text, affix))
        });
}

/// First capture group of `pattern`, or the whole match when it has none.
///
/// An empty first group counts as no match.
pub fn regexp(text: &str, pattern: &str) -> Result<String, BoxError> {
    let re = Regex::new(pattern)?;
    let caps = re.captures(text).ok_or(NoRegexpMatch)?;

    if caps.len() == 1 {
        return Ok(caps[0].to_string());
    }
    match caps.get(1) {
        Some(group) if !group.as_str().is_empty() => Ok(group.as_str().to_string()),
        _ => Err(NoRegexpMatch.into()),
    }
}

/// Remove every match of `pattern`.
pub fn strip(text: &str, pattern: &str) -> Result<String, BoxError> {
    let re = Regex::new(pattern)?;
    Ok(re.replace_all(text, "").into_owned())
}

pub fn prepend(text: &str, affix: &str) -> String {
    if text.starts_with(affix) {
        text.to_string()
    } else {
        format!("{affix}{text}")
    }
}

pub fn append(text: &str, affix: &str) -> String {
    if text.ends_with(affix) {
        text.to_string()
    } else {
        format!("{text}{affix}")
    }
}

pub fn path_prepend(text: &str, affix: &str) -> String {
    if text.starts_with(affix) {
        text.to_string()
    } else {
        join(&[affix, text])
    }
}

pub fn path_append(text: &str, affix: &str) -> String {
    if text.ends_with(affix) {
        text.to_string()
    } else {
        join(&[text, affix])
    }
}

/// Join non-empty parts with `/` and clean the result.
fn join(parts: &[&str]) -> String {
    let parts: Vec<&str> = parts.iter().copied().filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return String::new();
    }
    clean(&parts.join("/"))
}

/// Lexical slash-path cleanup: drops `.` and empty elements and resolves `..`.
fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("test", "s", "s")]
    #[case("the rain in spain falls", r" in (\w+)", "spain")]
    #[case("$12.50", r"[0-9.]+", "12.50")]
    fn test_regexp(#[case] text: &str, #[case] pattern: &str, #[case] expected: &str) {
        assert_eq!(regexp(text, pattern).unwrap(), expected);
    }

    #[rstest]
    #[case("the rain in spain falls", r" rain(\S?) ")]
    #[case("the rain in spain falls", " dogs ")]
    fn test_regexp_no_match(#[case] text: &str, #[case] pattern: &str) {
        let err = regexp(text, pattern).unwrap_err();
        assert_eq!(err.to_string(), "regexp did not match the content");
    }

    #[test]
    fn test_regexp_invalid_pattern() {
        assert!(regexp("x", "(").is_err());
        assert!(strip("x", "(").is_err());
    }

    #[test]
    fn test_strip() {
        assert_eq!(strip("a1b22c", r"\d").unwrap(), "abc");
        assert_eq!(strip("abc", "z").unwrap(), "abc");
    }

    #[test]
    fn test_affixes_are_idempotent() {
        assert_eq!(prepend("example.com", "https://"), "https://example.com");
        assert_eq!(prepend("https://example.com", "https://"), "https://example.com");
        assert_eq!(append("index", ".html"), "index.html");
        assert_eq!(append("index.html", ".html"), "index.html");
    }

    #[rstest]
    #[case("b/c", "/a", "/a/b/c")]
    #[case("/b", "a/", "a/b")]
    #[case("../c", "a/b", "a/c")]
    #[case("/a/b", "/a", "/a/b")]
    fn test_path_prepend(#[case] text: &str, #[case] affix: &str, #[case] expected: &str) {
        assert_eq!(path_prepend(text, affix), expected);
    }

    #[rstest]
    #[case("/a/b", "c", "/a/b/c")]
    #[case("a//b/", "./c", "a/b/c")]
    #[case("a/b/c", "b/c", "a/b/c")]
    fn test_path_append(#[case] text: &str, #[case] affix: &str, #[case] expected: &str) {
        assert_eq!(path_append(text, affix), expected);
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean("/../a"), "/a");
        assert_eq!(clean("../../a"), "../../a");
        assert_eq!(clean("a/.."), ".");
        assert_eq!(join(&["", ""]), "");
    }
}
