//! Compiled gate and parameter expressions
//!
//! Gate and parameter texts are compiled once into an AST when a histogram
//! is created (or regated) and evaluated once per committed event against a
//! scope built from the event record row. Compilation validates the text on
//! two levels:
//!
//! 1. Syntax: statements are rejected, only a single expression is allowed.
//! 2. Field references: the compiled expression is evaluated once against a
//!    zero-filled row; name, property, bounds and function resolution errors
//!    mean the text references something the schema does not provide.
//!
//! Value-dependent runtime errors during the trial run (e.g. integer
//! division by zero on the zero row) do not reject an expression; at fill
//! time such errors are counted per histogram and skip the event.
//!
//! An expression evaluates to zero or more numeric results: a scalar gives
//! one value, an array field (or array-valued expression) gives one value
//! per element.

use crate::error::{Result, SortError};
use crate::record::schema::Schema;
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};

/// A compiled expression bound to an event record schema
pub struct Expr {
    ast: AST,
    source: String,
}

impl Expr {
    /// The original expression text
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expr").field("source", &self.source).finish()
    }
}

/// Shared expression engine for one event record store
pub(crate) struct ExprEngine {
    engine: Engine,
}

impl ExprEngine {
    pub(crate) fn new() -> Self {
        let mut engine = Engine::new();
        // A missing nested path must surface as ErrorPropertyNotFound during
        // the trial evaluation rather than silently yielding ().
        engine.set_fail_on_invalid_map_property(true);
        Self { engine }
    }

    /// Compile an expression and validate its field references
    pub(crate) fn compile(&self, schema: &Schema, text: &str) -> Result<Expr> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SortError::compile(text, "empty expression"));
        }
        let ast = self
            .engine
            .compile_expression(trimmed)
            .map_err(|e| SortError::compile(trimmed, e))?;
        let expr = Expr {
            ast,
            source: trimmed.to_string(),
        };

        let mut scope = schema.zero_scope();
        if let Err(e) = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &expr.ast)
        {
            if is_resolution_error(&e) {
                return Err(SortError::compile(trimmed, e));
            }
        }
        Ok(expr)
    }

    /// Evaluate an expression to its numeric results
    pub(crate) fn eval_values(&self, expr: &Expr, scope: &mut Scope) -> Result<Vec<f64>> {
        let value = self
            .engine
            .eval_ast_with_scope::<Dynamic>(scope, &expr.ast)
            .map_err(|e| eval_error(expr, &e))?;
        if value.is_array() {
            let array = value
                .into_array()
                .map_err(|t| eval_error(expr, &format!("unexpected result type {}", t)))?;
            array
                .into_iter()
                .map(|element| to_scalar(expr, element))
                .collect()
        } else {
            Ok(vec![to_scalar(expr, value)?])
        }
    }

    /// Evaluate an expression as a gate condition (nonzero passes)
    pub(crate) fn eval_gate(&self, expr: &Expr, scope: &mut Scope) -> Result<bool> {
        let value = self
            .engine
            .eval_ast_with_scope::<Dynamic>(scope, &expr.ast)
            .map_err(|e| eval_error(expr, &e))?;
        if let Ok(b) = value.as_bool() {
            Ok(b)
        } else if let Ok(i) = value.as_int() {
            Ok(i != 0)
        } else if let Ok(f) = value.as_float() {
            Ok(f != 0.0)
        } else {
            Err(eval_error(expr, &"gate result is not boolean or numeric"))
        }
    }
}

fn to_scalar(expr: &Expr, value: Dynamic) -> Result<f64> {
    if let Ok(f) = value.as_float() {
        Ok(f)
    } else if let Ok(i) = value.as_int() {
        Ok(i as f64)
    } else if let Ok(b) = value.as_bool() {
        Ok(if b { 1.0 } else { 0.0 })
    } else {
        Err(eval_error(expr, &"result is not numeric"))
    }
}

fn eval_error(expr: &Expr, detail: &dyn std::fmt::Display) -> SortError {
    SortError::Histogram(format!(
        "evaluation of `{}` failed: {}",
        expr.source, detail
    ))
}

fn is_resolution_error(error: &EvalAltResult) -> bool {
    matches!(
        error,
        EvalAltResult::ErrorVariableNotFound(..)
            | EvalAltResult::ErrorPropertyNotFound(..)
            | EvalAltResult::ErrorFunctionNotFound(..)
            | EvalAltResult::ErrorArrayBounds(..)
            | EvalAltResult::ErrorIndexingType(..)
    )
}

/// Split a semicolon-separated parameter list and expand trailing ranges
///
/// `"a;b"` gives two entries; `"adc[0-3]"` expands inclusively into
/// `adc[0]`..`adc[3]`. Single-index entries like `adc[2]` pass through as
/// ordinary expressions.
pub(crate) fn parse_param_list(spec: &str) -> Result<Vec<String>> {
    let mut params = Vec::new();
    for entry in spec.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(SortError::compile(
                spec,
                "empty entry in parameter list",
            ));
        }
        match split_range(entry) {
            Some((base, from, to)) if from <= to => {
                for i in from..=to {
                    params.push(format!("{}[{}]", base, i));
                }
            }
            Some((_, from, to)) => {
                return Err(SortError::compile(
                    spec,
                    format!("invalid range {}-{}", from, to),
                ));
            }
            None => params.push(entry.to_string()),
        }
    }
    Ok(params)
}

/// Parse `name[a-b]` into (name, a, b); anything else returns None
fn split_range(entry: &str) -> Option<(&str, usize, usize)> {
    let open = entry.find('[')?;
    if !entry.ends_with(']') {
        return None;
    }
    let inner = &entry[open + 1..entry.len() - 1];
    let (from, to) = inner.split_once('-')?;
    let from = from.trim().parse::<usize>().ok()?;
    let to = to.trim().parse::<usize>().ok()?;
    Some((&entry[..open], from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldKind;

    fn test_schema() -> Schema {
        let mut schema = Schema::new();
        schema.register("e", FieldKind::F64).unwrap();
        schema.register("tof", FieldKind::F64).unwrap();
        schema.register("flags", FieldKind::U16).unwrap();
        schema.register_array("adc", FieldKind::F64, 4).unwrap();
        schema.register("det.energy", FieldKind::F64).unwrap();
        schema
    }

    #[test]
    fn test_compile_valid_expressions() {
        let schema = test_schema();
        let engine = ExprEngine::new();
        for text in ["e", "1", "e > 100.0 && tof < 50.0", "adc", "adc[2]", "det.energy * 2.0"] {
            assert!(engine.compile(&schema, text).is_ok(), "failed: {}", text);
        }
    }

    #[test]
    fn test_compile_unknown_field_fails() {
        let schema = test_schema();
        let engine = ExprEngine::new();
        let err = engine.compile(&schema, "missing > 1.0").unwrap_err();
        assert!(matches!(err, SortError::Compile { .. }));

        let err = engine.compile(&schema, "det.missing").unwrap_err();
        assert!(matches!(err, SortError::Compile { .. }));
    }

    #[test]
    fn test_compile_out_of_bounds_index_fails() {
        let schema = test_schema();
        let engine = ExprEngine::new();
        let err = engine.compile(&schema, "adc[7]").unwrap_err();
        assert!(matches!(err, SortError::Compile { .. }));
    }

    #[test]
    fn test_compile_malformed_text_fails() {
        let schema = test_schema();
        let engine = ExprEngine::new();
        for text in ["", "e +", "let x = 1", "e; tof"] {
            assert!(engine.compile(&schema, text).is_err(), "accepted: {}", text);
        }
    }

    #[test]
    fn test_eval_scalar_and_array() {
        let schema = test_schema();
        let engine = ExprEngine::new();
        let mut slots = vec![0.0; schema.slots()];
        slots[schema.field("e").unwrap().slot] = 5.5;
        let adc = schema.field("adc").unwrap();
        for (i, v) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            slots[adc.slot + i] = *v;
        }

        let e = engine.compile(&schema, "e").unwrap();
        let arr = engine.compile(&schema, "adc").unwrap();
        let mut scope = schema.build_scope(&slots);
        assert_eq!(engine.eval_values(&e, &mut scope).unwrap(), vec![5.5]);
        assert_eq!(
            engine.eval_values(&arr, &mut scope).unwrap(),
            vec![1.0, 2.0, 3.0, 4.0]
        );
    }

    #[test]
    fn test_eval_gate_truthiness() {
        let schema = test_schema();
        let engine = ExprEngine::new();
        let mut slots = vec![0.0; schema.slots()];
        slots[schema.field("flags").unwrap().slot] = 3.0;
        let mut scope = schema.build_scope(&slots);

        let always = engine.compile(&schema, "1").unwrap();
        let bitand = engine.compile(&schema, "flags & 2").unwrap();
        let off = engine.compile(&schema, "flags & 4").unwrap();
        assert!(engine.eval_gate(&always, &mut scope).unwrap());
        assert!(engine.eval_gate(&bitand, &mut scope).unwrap());
        assert!(!engine.eval_gate(&off, &mut scope).unwrap());
    }

    #[test]
    fn test_integer_fields_surface_as_integers() {
        let schema = test_schema();
        let engine = ExprEngine::new();
        let mut slots = vec![0.0; schema.slots()];
        slots[schema.field("flags").unwrap().slot] = 0b10011 as f64;
        let mut scope = schema.build_scope(&slots);

        let shifted = engine.compile(&schema, "flags >> 1").unwrap();
        assert_eq!(engine.eval_values(&shifted, &mut scope).unwrap(), vec![9.0]);
    }

    #[test]
    fn test_parse_param_list() {
        assert_eq!(parse_param_list("a;b").unwrap(), vec!["a", "b"]);
        assert_eq!(
            parse_param_list("adc[1-3]").unwrap(),
            vec!["adc[1]", "adc[2]", "adc[3]"]
        );
        assert_eq!(parse_param_list("adc[2]").unwrap(), vec!["adc[2]"]);
        assert!(parse_param_list("a;;b").is_err());
        assert!(parse_param_list("adc[3-1]").is_err());
    }
}
