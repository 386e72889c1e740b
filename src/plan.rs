//! Annotation compiler
//!
//! An annotation is the per-field directive string:
//!
//! ```text
//! [(flag[, flag...]) ]selector[ | accessor][ | step]...
//! ```
//!
//! - `selector` is a CSS selector; `.` or `self` keeps the current context.
//! - `accessor` is `text`, `markup` or `attribute(name)`.
//! - each `step` is `name` or `name(args)`, resolved first against the
//!   transforms and then against the terminal constructors of a [`Registry`].
//!   A terminal, if any, must be the last step.
//!
//! Segments are separated by the literal `" | "`.

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;
use serde::Serialize;

use crate::error::CompileError;
use crate::registry::{Registry, TerminalFn, TransformFn};

const SEPARATOR: &str = " | ";

/// Flag that turns an unmatched selector into a silent skip.
pub const OPTIONAL: &str = "optional";

static FLAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\(\s*([^()]*?)\s*\)\s*").expect("flags pattern is valid"));

/// How raw content is pulled out of a matched context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessor {
    /// No extraction; constructors read the context directly.
    None,
    Text,
    Markup,
    Attribute(String),
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::None => Ok(()),
            Accessor::Text => write!(f, "text"),
            Accessor::Markup => write!(f, "markup"),
            Accessor::Attribute(name) => write!(f, "attribute({name})"),
        }
    }
}

/// A named function bound to its argument string.
#[derive(Clone, Serialize)]
pub struct Step<F> {
    pub name: String,
    pub arg: String,
    #[serde(skip)]
    pub(crate) func: F,
}

impl<F> PartialEq for Step<F> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.arg == other.arg
    }
}

impl<F> fmt::Debug for Step<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.arg)
    }
}

/// Compiled form of one annotation.
#[derive(Clone, Serialize)]
pub struct Plan {
    selector: String,
    #[serde(skip)]
    compiled: Option<Selector>,
    accessor: Accessor,
    pipeline: Vec<Step<TransformFn>>,
    terminal: Option<Step<TerminalFn>>,
    flags: BTreeSet<String>,
}

impl Plan {
    /// Selector as written in the annotation.
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// The selector to narrow with, or `None` for the self sentinels.
    pub fn narrowing(&self) -> Option<&Selector> {
        self.compiled.as_ref()
    }

    pub fn accessor(&self) -> &Accessor {
        &self.accessor
    }

    pub fn pipeline(&self) -> &[Step<TransformFn>] {
        &self.pipeline
    }

    pub fn terminal(&self) -> Option<&Step<TerminalFn>> {
        self.terminal.as_ref()
    }

    pub fn flags(&self) -> &BTreeSet<String> {
        &self.flags
    }

    pub fn is_optional(&self) -> bool {
        self.flags.contains(OPTIONAL)
    }
}

impl PartialEq for Plan {
    fn eq(&self, other: &Self) -> bool {
        self.selector == other.selector
            && self.accessor == other.accessor
            && self.pipeline == other.pipeline
            && self.terminal == other.terminal
            && self.flags == other.flags
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("selector", &self.selector)
            .field("accessor", &self.accessor)
            .field("pipeline", &self.pipeline)
            .field("terminal", &self.terminal)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Compile `annotation` against the functions registered in `registry`.
///
/// Returns `Ok(None)` when the annotation is empty, meaning the field carries
/// no directive and is skipped.
pub fn compile(annotation: &str, registry: &Registry) -> Result<Option<Plan>, CompileError> {
    if annotation.is_empty() {
        return Ok(None);
    }

    let syntax = |reason: &str| CompileError::Syntax {
        annotation: annotation.to_string(),
        reason: reason.to_string(),
    };

    let (flags, rest) = split_flags(annotation);
    let mut segments = rest.split(SEPARATOR).map(str::trim);

    let selector = segments.next().unwrap_or_default();
    if selector.is_empty() {
        return Err(syntax("missing selector"));
    }
    let compiled = match selector {
        "." | "self" => None,
        _ => Some(
            Selector::parse(selector).map_err(|e| CompileError::InvalidSelector {
                selector: selector.to_string(),
                reason: e.to_string(),
            })?,
        ),
    };

    let accessor = match segments.next() {
        Some(segment) => parse_accessor(segment)?,
        None => Accessor::None,
    };

    let mut pipeline = Vec::new();
    let mut terminal: Option<Step<TerminalFn>> = None;

    for segment in segments {
        let (name, arg) = parse_signature(segment).ok_or_else(|| syntax("malformed step"))?;

        if let Some(current) = &terminal {
            return Err(CompileError::MisplacedTerminal {
                name: name.to_string(),
                terminal: current.name.clone(),
            });
        }

        if let Some(func) = registry.transform(name) {
            pipeline.push(Step {
                name: name.to_string(),
                arg: arg.to_string(),
                func: func.clone(),
            });
        } else if let Some(func) = registry.terminal(name) {
            terminal = Some(Step {
                name: name.to_string(),
                arg: arg.to_string(),
                func: func.clone(),
            });
        } else {
            return Err(CompileError::UnresolvedFunction {
                name: name.to_string(),
            });
        }
    }

    tracing::trace!(annotation, steps = pipeline.len(), "compiled annotation");

    Ok(Some(Plan {
        selector: selector.to_string(),
        compiled,
        accessor,
        pipeline,
        terminal,
        flags,
    }))
}

/// Strip a leading `(flag, ...)` group.
fn split_flags(annotation: &str) -> (BTreeSet<String>, &str) {
    match FLAGS.captures(annotation) {
        Some(caps) => {
            let flags = caps
                .get(1)
                .map(|m| m.as_str())
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|flag| !flag.is_empty())
                .map(String::from)
                .collect();
            let end = caps.get(0).map_or(0, |m| m.end());
            (flags, &annotation[end..])
        }
        None => (BTreeSet::new(), annotation),
    }
}

fn parse_accessor(segment: &str) -> Result<Accessor, CompileError> {
    let unknown = || CompileError::UnknownAccessor {
        segment: segment.to_string(),
    };

    match segment {
        "text" => Ok(Accessor::Text),
        "markup" => Ok(Accessor::Markup),
        _ => {
            let name = segment
                .strip_prefix("attribute(")
                .and_then(|rest| rest.strip_suffix(')'))
                .map(str::trim)
                .ok_or_else(unknown)?;
            if name.is_empty() {
                return Err(unknown());
            }
            Ok(Accessor::Attribute(name.to_string()))
        }
    }
}

/// Split `name(args)` into its parts. Arguments keep their inner whitespace.
fn parse_signature(segment: &str) -> Option<(&str, &str)> {
    let (name, arg) = match segment.find('(') {
        Some(open) => {
            let arg = segment[open + 1..].strip_suffix(')')?;
            (segment[..open].trim(), arg)
        }
        None => (segment, ""),
    };

    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((name, arg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn compile_ok(annotation: &str) -> Plan {
        compile(annotation, &Registry::new())
            .expect("annotation compiles")
            .expect("annotation is present")
    }

    #[test]
    fn test_full_annotation() {
        let plan =
            compile_ok(r"(optional, strict) p.time | text | regexp([\d\s]{10,}) | time(%Y %m %d)");

        assert_eq!(plan.selector(), "p.time");
        assert!(plan.narrowing().is_some());
        assert_eq!(plan.accessor(), &Accessor::Text);
        assert_eq!(plan.pipeline().len(), 1);
        assert_eq!(plan.pipeline()[0].name, "regexp");
        assert_eq!(plan.pipeline()[0].arg, r"[\d\s]{10,}");

        let terminal = plan.terminal().unwrap();
        assert_eq!(terminal.name, "time");
        assert_eq!(terminal.arg, "%Y %m %d");

        assert!(plan.is_optional());
        assert_eq!(
            plan.flags().iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["optional", "strict"]
        );
    }

    #[test]
    fn test_selector_only() {
        let plan = compile_ok("table.list tr");
        assert_eq!(plan.accessor(), &Accessor::None);
        assert!(plan.pipeline().is_empty());
        assert!(plan.terminal().is_none());
        assert!(plan.flags().is_empty());
    }

    #[rstest]
    #[case(". | markup")]
    #[case("self | markup")]
    fn test_self_sentinels_do_not_narrow(#[case] annotation: &str) {
        let plan = compile_ok(annotation);
        assert!(plan.narrowing().is_none());
        assert_eq!(plan.accessor(), &Accessor::Markup);
    }

    #[test]
    fn test_bare_sentinel() {
        let plan = compile_ok("()  self");
        assert!(plan.narrowing().is_none());
        assert_eq!(plan.accessor(), &Accessor::None);
        assert!(plan.terminal().is_none());
    }

    #[test]
    fn test_attribute_accessor() {
        let plan = compile_ok("a | attribute( href )");
        assert_eq!(plan.accessor(), &Accessor::Attribute("href".to_string()));
        assert_eq!(plan.accessor().to_string(), "attribute(href)");
    }

    #[test]
    fn test_empty_is_not_annotated() {
        assert_eq!(compile("", &Registry::new()), Ok(None));
    }

    #[rstest]
    #[case("   ")]
    #[case("(optional)  ")]
    #[case(" | text")]
    fn test_blank_selector_is_syntax_error(#[case] annotation: &str) {
        assert_eq!(
            compile(annotation, &Registry::new()),
            Err(CompileError::Syntax {
                annotation: annotation.to_string(),
                reason: "missing selector".to_string(),
            })
        );
    }

    #[rstest]
    #[case("a | html")]
    #[case("a | attr(href)")]
    #[case("a | attribute()")]
    #[case("a | Text")]
    fn test_unknown_accessor(#[case] annotation: &str) {
        let segment = annotation.split(" | ").nth(1).unwrap();
        assert_eq!(
            compile(annotation, &Registry::new()),
            Err(CompileError::UnknownAccessor {
                segment: segment.to_string()
            })
        );
    }

    #[rstest]
    #[case(" | text")]
    #[case("(optional)")]
    #[case("p | text | regexp(abc")]
    #[case("p | text | (x)")]
    fn test_syntax_errors(#[case] annotation: &str) {
        let err = compile(annotation, &Registry::new()).unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }), "{err}");
    }

    #[test]
    fn test_unresolved_function() {
        assert_eq!(
            compile("p | text | derp(1)", &Registry::new()),
            Err(CompileError::UnresolvedFunction {
                name: "derp".to_string()
            })
        );
    }

    #[test]
    fn test_invalid_selector() {
        let err = compile("p[ | text", &Registry::new()).unwrap_err();
        assert!(matches!(err, CompileError::InvalidSelector { .. }), "{err}");
    }

    #[test]
    fn test_terminal_must_be_last() {
        assert_eq!(
            compile("p | text | time(%Y) | append(x)", &Registry::new()),
            Err(CompileError::MisplacedTerminal {
                name: "append".to_string(),
                terminal: "time".to_string(),
            })
        );
        assert!(matches!(
            compile("p | text | ago | time(%Y)", &Registry::new()),
            Err(CompileError::MisplacedTerminal { .. })
        ));
    }

    #[test]
    fn test_transforms_take_precedence_over_terminals() {
        let mut registry = Registry::new();
        registry.register_transform("time", |s: &str, _: &str| {
            Ok::<_, std::io::Error>(s.to_string())
        });
        let plan = compile("p | text | time(x)", &registry).unwrap().unwrap();
        assert_eq!(plan.pipeline().len(), 1);
        assert!(plan.terminal().is_none());
    }

    #[test]
    fn test_compile_is_deterministic() {
        let registry = Registry::new();
        for annotation in [
            "div",
            "(optional) a | attribute(href) | prepend(https://x.org) | append(/)",
            "p | text | strip(\\s+) | ago",
        ] {
            assert_eq!(
                compile(annotation, &registry),
                compile(annotation, &registry)
            );
        }
    }

    #[test]
    fn test_plan_serializes() {
        let plan = compile_ok("a | attribute(href) | append(/)");
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["selector"], "a");
        assert_eq!(json["accessor"]["attribute"], "href");
        assert_eq!(json["pipeline"][0]["name"], "append");
    }
}
