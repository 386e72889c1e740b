//! ECMAScript script type, parsed with swc.

use serde_json::{Map, Number, Value};
use swc_common::{sync::Lrc, FileName, SourceMap};
use swc_ecma_ast::{
    AssignTarget, Decl, Expr, Lit, Pat, Prop, PropName, PropOrSpread, SimpleAssignTarget, Stmt,
    UnaryOp,
};
use swc_ecma_parser::{lexer::Lexer, Parser, StringInput, Syntax};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("script parse failed: {0}")]
pub struct ScriptError(String);

/// A parsed script body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub body: Vec<Stmt>,
}

crate::opaque!(Script);

impl Script {
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        let cm: Lrc<SourceMap> = Default::default();
        let fm = cm.new_source_file(FileName::Anon.into(), source.to_string());

        let lexer = Lexer::new(
            Syntax::Es(Default::default()),
            Default::default(),
            StringInput::from(&*fm),
            None,
        );

        let mut parser = Parser::new_from(lexer);
        let script = parser
            .parse_script()
            .map_err(|err| ScriptError(format!("{:?}", err.kind())))?;

        // recovered errors still mean the source is not a valid script
        if let Some(err) = parser.take_errors().into_iter().next() {
            return Err(ScriptError(format!("{:?}", err.kind())));
        }

        Ok(Self { body: script.body })
    }

    /// Literal values assigned to top-level variables, by name.
    ///
    /// Covers `var`/`let`/`const` declarations and plain `name = value`
    /// assignments whose right-hand side is a JSON-like literal.
    pub fn literals(&self) -> Map<String, Value> {
        let mut literals = Map::new();

        for stmt in &self.body {
            match stmt {
                Stmt::Decl(Decl::Var(var)) => {
                    for decl in &var.decls {
                        if let (Pat::Ident(ident), Some(init)) = (&decl.name, &decl.init) {
                            if let Some(value) = literal(init) {
                                literals.insert(ident.sym.as_str().to_string(), value);
                            }
                        }
                    }
                }
                Stmt::Expr(stmt) => {
                    let Expr::Assign(assign) = &*stmt.expr else {
                        continue;
                    };
                    if let AssignTarget::Simple(SimpleAssignTarget::Ident(ident)) = &assign.left {
                        if let Some(value) = literal(&assign.right) {
                            literals.insert(ident.sym.as_str().to_string(), value);
                        }
                    }
                }
                _ => {}
            }
        }

        literals
    }
}

fn literal(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Lit(Lit::Str(s)) => s.value.as_str().map(|v| Value::String(v.to_string())),
        Expr::Lit(Lit::Num(n)) => number(n.value),
        Expr::Unary(unary) if unary.op == UnaryOp::Minus => match &*unary.arg {
            Expr::Lit(Lit::Num(n)) => number(-n.value),
            _ => None,
        },
        Expr::Lit(Lit::Bool(b)) => Some(Value::Bool(b.value)),
        Expr::Lit(Lit::Null(_)) => Some(Value::Null),
        Expr::Array(array) => array
            .elems
            .iter()
            .map(|elem| match elem {
                Some(elem) if elem.spread.is_none() => literal(&elem.expr),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        Expr::Object(object) => {
            let mut map = Map::new();
            for prop in &object.props {
                let PropOrSpread::Prop(prop) = prop else {
                    return None;
                };
                let Prop::KeyValue(kv) = &**prop else {
                    return None;
                };
                map.insert(prop_name(&kv.key)?, literal(&kv.value)?);
            }
            Some(Value::Object(map))
        }
        Expr::Paren(paren) => literal(&paren.expr),
        _ => None,
    }
}

/// Integral values are kept as integers.
fn number(value: f64) -> Option<Value> {
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
        Some(Value::Number(Number::from(value as i64)))
    } else {
        Number::from_f64(value).map(Value::Number)
    }
}

fn prop_name(name: &PropName) -> Option<String> {
    match name {
        PropName::Ident(ident) => Some(ident.sym.as_str().to_string()),
        PropName::Str(s) => s.value.as_str().map(str::to_string),
        PropName::Num(n) => Some(n.value.to_string()),
        _ => None,
    }
}
