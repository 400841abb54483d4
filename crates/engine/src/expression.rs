//! `${...}` template resolution and condition evaluation over the executor's
//! layered input scope.
//!
//! Deliberately small: a path-lookup template language plus a handful of
//! comparison operators, not a general expression grammar. Node-specific
//! logic belongs in the node, not in the templates that wire nodes together.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("invalid condition expression: {0}")]
    InvalidCondition(String),
}

/// Consumed by the executor to resolve `${...}` references and evaluate
/// connection `condition` expressions.
pub trait ExpressionEvaluator: Send + Sync {
    /// Resolve a single `${...}` reference (or a plain literal) against
    /// `scope`, returning the referenced JSON value.
    fn eval(&self, expr: &str, scope: &Value) -> Result<Value, EvalError>;

    /// Walk `input`, replacing every `${...}` occurrence found in string
    /// values with its resolution against `scope`. A string that is
    /// *exactly* one template reference resolves to the referenced value's
    /// own type; a string containing a template alongside other text is
    /// resolved to its string form and substituted in place.
    fn resolve_templates(&self, input: &Value, scope: &Value) -> Result<Value, EvalError>;

    /// Evaluate a connection's `condition` string against `scope` and
    /// reduce it to a boolean. Used to decide whether an edge is satisfied.
    fn eval_condition(&self, expr: &str, scope: &Value) -> Result<bool, EvalError>;
}

static TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^{}]+)\}").expect("static regex is valid"));

static COMPARISON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<lhs>.+?)\s*(?P<op>==|!=|>=|<=|>|<)\s*(?P<rhs>.+)$")
        .expect("static regex is valid")
});

/// Resolve a dotted path (`variables.foo`, `NodeA.output.bar`) against a
/// JSON scope. Array segments that parse as an integer index into arrays.
fn resolve_path(path: &str, scope: &Value) -> Option<Value> {
    let mut current = scope;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let idx: usize = segment.parse().ok()?;
                items.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current.clone())
}

fn value_as_compare_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Default implementation of [`ExpressionEvaluator`], backed by a single
/// regex that matches `${path}` tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateEvaluator;

impl TemplateEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn eval_side(&self, raw: &str, scope: &Value) -> Result<Value, EvalError> {
        let trimmed = raw.trim();
        if TEMPLATE_RE.is_match(trimmed) {
            self.eval(trimmed, scope)
        } else if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
            Ok(parsed)
        } else {
            Ok(Value::String(trimmed.trim_matches('"').to_string()))
        }
    }
}

impl ExpressionEvaluator for TemplateEvaluator {
    fn eval(&self, expr: &str, scope: &Value) -> Result<Value, EvalError> {
        let trimmed = expr.trim();
        if let Some(caps) = TEMPLATE_RE.captures(trimmed) {
            let whole_match = caps.get(0).unwrap();
            let is_whole_string = whole_match.start() == 0 && whole_match.end() == trimmed.len();
            if is_whole_string {
                let path = caps.get(1).unwrap().as_str().trim();
                return resolve_path(path, scope)
                    .ok_or_else(|| EvalError::UnresolvedReference(path.to_string()));
            }

            let mut out = String::with_capacity(trimmed.len());
            let mut last_end = 0;
            for caps in TEMPLATE_RE.captures_iter(trimmed) {
                let whole = caps.get(0).unwrap();
                let path = caps.get(1).unwrap().as_str().trim();
                let resolved = resolve_path(path, scope)
                    .ok_or_else(|| EvalError::UnresolvedReference(path.to_string()))?;
                out.push_str(&trimmed[last_end..whole.start()]);
                out.push_str(&value_as_compare_string(&resolved));
                last_end = whole.end();
            }
            out.push_str(&trimmed[last_end..]);
            return Ok(Value::String(out));
        }

        // No template syntax: treat as a literal JSON value, falling back
        // to a plain string.
        serde_json::from_str::<Value>(trimmed).or(Ok(Value::String(trimmed.to_string())))
    }

    fn resolve_templates(&self, input: &Value, scope: &Value) -> Result<Value, EvalError> {
        match input {
            Value::String(s) => {
                if TEMPLATE_RE.is_match(s) {
                    self.eval(s, scope)
                } else {
                    Ok(input.clone())
                }
            }
            Value::Array(items) => {
                let resolved: Result<Vec<Value>, EvalError> = items
                    .iter()
                    .map(|item| self.resolve_templates(item, scope))
                    .collect();
                Ok(Value::Array(resolved?))
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve_templates(v, scope)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn eval_condition(&self, expr: &str, scope: &Value) -> Result<bool, EvalError> {
        let trimmed = expr.trim();
        if let Some(caps) = COMPARISON_RE.captures(trimmed) {
            let lhs = self.eval_side(&caps["lhs"], scope)?;
            let rhs = self.eval_side(&caps["rhs"], scope)?;
            let op = &caps["op"];

            let ordering = |l: &Value, r: &Value| -> Result<std::cmp::Ordering, EvalError> {
                match (l.as_f64(), r.as_f64()) {
                    (Some(lf), Some(rf)) => lf
                        .partial_cmp(&rf)
                        .ok_or_else(|| EvalError::InvalidCondition(trimmed.to_string())),
                    _ => Ok(value_as_compare_string(l).cmp(&value_as_compare_string(r))),
                }
            };

            return match op {
                "==" => Ok(lhs == rhs),
                "!=" => Ok(lhs != rhs),
                ">" => Ok(ordering(&lhs, &rhs)?.is_gt()),
                "<" => Ok(ordering(&lhs, &rhs)?.is_lt()),
                ">=" => Ok(!ordering(&lhs, &rhs)?.is_lt()),
                "<=" => Ok(!ordering(&lhs, &rhs)?.is_gt()),
                _ => unreachable!("regex only captures known operators"),
            };
        }

        let resolved = self.eval(trimmed, scope)?;
        Ok(is_truthy(&resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> Value {
        json!({
            "variables": {"threshold": 10, "name": "ada"},
            "NodeA": {"output": {"count": 5, "ok": true}},
        })
    }

    #[test]
    fn eval_whole_string_reference_preserves_type() {
        let ev = TemplateEvaluator::new();
        let result = ev.eval("${NodeA.output.count}", &scope()).unwrap();
        assert_eq!(result, json!(5));
    }

    #[test]
    fn eval_embedded_reference_interpolates_as_string() {
        let ev = TemplateEvaluator::new();
        let result = ev.eval("hello ${variables.name}!", &scope()).unwrap();
        assert_eq!(result, json!("hello ada!"));
    }

    #[test]
    fn unresolved_reference_is_reported() {
        let ev = TemplateEvaluator::new();
        let err = ev.eval("${variables.missing}", &scope()).unwrap_err();
        assert!(matches!(err, EvalError::UnresolvedReference(_)));
    }

    #[test]
    fn resolve_templates_walks_nested_structures() {
        let ev = TemplateEvaluator::new();
        let input = json!({"a": "${variables.name}", "b": [1, "${NodeA.output.count}"]});
        let resolved = ev.resolve_templates(&input, &scope()).unwrap();
        assert_eq!(resolved["a"], json!("ada"));
        assert_eq!(resolved["b"][1], json!("5"));
    }

    #[test]
    fn condition_numeric_comparison() {
        let ev = TemplateEvaluator::new();
        assert!(ev
            .eval_condition("${NodeA.output.count} > ${variables.threshold}", &scope())
            .map(|_| ())
            .is_ok());
        assert!(!ev
            .eval_condition("${NodeA.output.count} > ${variables.threshold}", &scope())
            .unwrap());
        assert!(ev
            .eval_condition("${variables.threshold} >= 10", &scope())
            .unwrap());
    }

    #[test]
    fn condition_truthy_fallback() {
        let ev = TemplateEvaluator::new();
        assert!(ev.eval_condition("${NodeA.output.ok}", &scope()).unwrap());
    }
}
