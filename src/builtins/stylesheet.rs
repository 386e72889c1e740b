//! CSS stylesheet type, tokenized with cssparser.

use cssparser::{Delimiter, ParseError, Parser, ParserInput, Token};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stylesheet parse failed at {line}:{column}: {message}")]
pub struct StylesheetError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stylesheet {
    pub rules: Vec<Rule>,
}

crate::opaque!(Stylesheet);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    Style(StyleRule),
    At(AtRule),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleRule {
    pub selectors: String,
    pub declarations: Vec<Declaration>,
}

/// `@name prelude;` or `@name prelude { ... }`. Grouping rules such as
/// `@media` hold nested rules, the others hold declarations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtRule {
    pub name: String,
    pub prelude: String,
    pub rules: Vec<Rule>,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Declaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

const GROUPING: &[&str] = &["media", "supports", "document", "layer", "container"];

impl Stylesheet {
    pub fn parse(source: &str) -> Result<Self, StylesheetError> {
        let mut input = ParserInput::new(source);
        let mut parser = Parser::new(&mut input);

        let rules = parse_rules(&mut parser).map_err(|err| StylesheetError {
            line: err.location.line,
            column: err.location.column,
            message: format!("{:?}", err.kind),
        })?;

        Ok(Self { rules })
    }

    /// Style rules at any nesting depth, in source order.
    pub fn style_rules(&self) -> Vec<&StyleRule> {
        fn walk<'a>(rules: &'a [Rule], out: &mut Vec<&'a StyleRule>) {
            for rule in rules {
                match rule {
                    Rule::Style(style) => out.push(style),
                    Rule::At(at) => walk(&at.rules, out),
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.rules, &mut out);
        out
    }
}

type Failure<'i> = ParseError<'i, ()>;

fn parse_rules<'i>(input: &mut Parser<'i, '_>) -> Result<Vec<Rule>, Failure<'i>> {
    let mut rules = Vec::new();

    loop {
        let state = input.state();
        let token = match input.next() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };

        match token {
            Token::AtKeyword(name) => rules.push(Rule::At(parse_at_rule(name.to_string(), input)?)),
            Token::CDO | Token::CDC | Token::Semicolon => {}
            _ => {
                input.reset(&state);
                rules.push(Rule::Style(parse_style_rule(input)?));
            }
        }
    }

    Ok(rules)
}

/// Source text up to (not including) the next block or semicolon.
fn prelude<'i>(input: &mut Parser<'i, '_>) -> Result<String, Failure<'i>> {
    let start = input.position();
    input.parse_until_before(Delimiter::CurlyBracketBlock | Delimiter::Semicolon, |p| {
        while p.next().is_ok() {}
        Ok::<_, Failure<'i>>(())
    })?;
    Ok(input.slice_from(start).trim().to_string())
}

fn parse_style_rule<'i>(input: &mut Parser<'i, '_>) -> Result<StyleRule, Failure<'i>> {
    let selectors = prelude(input)?;

    let token = input.next()?.clone();
    match token {
        Token::CurlyBracketBlock => {}
        token => return Err(input.new_unexpected_token_error(token)),
    }
    let declarations = input.parse_nested_block(|p| parse_declarations(p))?;

    Ok(StyleRule {
        selectors,
        declarations,
    })
}

fn parse_at_rule<'i>(name: String, input: &mut Parser<'i, '_>) -> Result<AtRule, Failure<'i>> {
    let mut rule = AtRule {
        prelude: prelude(input)?,
        name,
        rules: Vec::new(),
        declarations: Vec::new(),
    };

    let token = match input.next() {
        Ok(token) => token.clone(),
        // statement at-rule at end of input
        Err(_) => return Ok(rule),
    };

    match token {
        Token::Semicolon => {}
        Token::CurlyBracketBlock if is_grouping(&rule.name) => {
            rule.rules = input.parse_nested_block(|p| parse_rules(p))?;
        }
        Token::CurlyBracketBlock => {
            rule.declarations = input.parse_nested_block(|p| parse_declarations(p))?;
        }
        token => return Err(input.new_unexpected_token_error(token)),
    }

    Ok(rule)
}

fn is_grouping(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    GROUPING.contains(&name.as_str()) || name.ends_with("keyframes")
}

fn parse_declarations<'i>(input: &mut Parser<'i, '_>) -> Result<Vec<Declaration>, Failure<'i>> {
    let mut declarations = Vec::new();

    while !input.is_exhausted() {
        let declaration = input.parse_until_after(Delimiter::Semicolon, |p| {
            if p.is_exhausted() {
                return Ok::<_, Failure<'i>>(None);
            }
            let property = p.expect_ident()?.to_string();
            p.expect_colon()?;

            let start = p.position();
            while p.next().is_ok() {}
            let (value, important) = split_important(p.slice_from(start).trim());

            Ok(Some(Declaration {
                property,
                value,
                important,
            }))
        })?;
        declarations.extend(declaration);
    }

    Ok(declarations)
}

fn split_important(value: &str) -> (String, bool) {
    if let Some(idx) = value.rfind('!') {
        let (head, tail) = value.split_at(idx);
        if tail[1..].trim().eq_ignore_ascii_case("important") {
            return (head.trim_end().to_string(), true);
        }
    }
    (value.to_string(), false)
}
