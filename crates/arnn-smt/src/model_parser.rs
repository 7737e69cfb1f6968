//! Parse SMT-LIB model output to extract variable values.
//!
//! Z3 answers `(get-model)` with:
//! ```text
//! (
//!   (define-fun n0_0 () Real 5.0)
//!   (define-fun n0_1 () Real (- 3.0))
//!   (define-fun n2_0 () Real (/ 7.0 2.0))
//! )
//! ```

use std::collections::BTreeMap;

/// Values of `var_names`, in order. `None` if any is missing from the
/// model.
pub fn parse_model(model_str: &str, var_names: &[&str]) -> Option<Vec<f64>> {
    let model = parse_model_to_map(model_str)?;
    var_names.iter().map(|name| model.get(*name).copied()).collect()
}

/// Every `Real`/`Int` constant defined in the model.
pub fn parse_model_to_map(model_str: &str) -> Option<BTreeMap<String, f64>> {
    if model_str.trim_start().starts_with("(error") {
        tracing::debug!(model = model_str, "solver returned an error instead of a model");
        return None;
    }

    let mut values = BTreeMap::new();
    let bytes = model_str.as_bytes();
    let mut pos = 0;
    while let Some(start) = model_str[pos..].find("(define-fun ") {
        pos += start + "(define-fun ".len();
        pos = skip_whitespace(bytes, pos);

        let name_start = pos;
        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'(' {
            pos += 1;
        }
        let name = model_str[name_start..pos].to_string();

        // argument list, then sort
        pos = skip_until_char(bytes, pos, b')')? + 1;
        pos = skip_whitespace(bytes, pos);
        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }

        let (value, end) = parse_value(model_str, pos)?;
        values.insert(name, value);
        pos = end;
    }
    Some(values)
}

/// A single numeric literal such as `2.5`, `(- 1.0)` or `(/ 1.0 3.0)`.
pub fn parse_value_literal(s: &str) -> Option<f64> {
    let (value, end) = parse_value(s, 0)?;
    s[end..].trim().is_empty().then_some(value)
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn skip_until_char(bytes: &[u8], mut pos: usize, target: u8) -> Option<usize> {
    while pos < bytes.len() {
        if bytes[pos] == target {
            return Some(pos);
        }
        pos += 1;
    }
    None
}

/// Number, negation or fraction starting at `pos`, and the position after it.
fn parse_value(s: &str, pos: usize) -> Option<(f64, usize)> {
    let bytes = s.as_bytes();
    let pos = skip_whitespace(bytes, pos);
    if pos >= bytes.len() {
        return None;
    }

    match bytes[pos] {
        b'(' => {
            let op_start = skip_whitespace(bytes, pos + 1);
            let mut op_end = op_start;
            while op_end < bytes.len() && !bytes[op_end].is_ascii_whitespace() && bytes[op_end] != b')' {
                op_end += 1;
            }
            match &s[op_start..op_end] {
                "-" => {
                    let (a, a_end) = parse_value(s, op_end)?;
                    let after = skip_whitespace(bytes, a_end);
                    if after < bytes.len() && bytes[after] == b')' {
                        Some((-a, after + 1))
                    } else {
                        let (b, b_end) = parse_value(s, a_end)?;
                        let close = skip_until_char(bytes, b_end, b')')?;
                        Some((a - b, close + 1))
                    }
                }
                "/" => {
                    let (num, num_end) = parse_value(s, op_end)?;
                    let (denom, denom_end) = parse_value(s, num_end)?;
                    let close = skip_until_char(bytes, denom_end, b')')?;
                    Some((num / denom, close + 1))
                }
                _ => None,
            }
        }
        b'-' if bytes.get(pos + 1).is_some_and(|b| b.is_ascii_digit() || *b == b'.') => {
            let (value, end) = parse_number(s, pos + 1)?;
            Some((-value, end))
        }
        _ => parse_number(s, pos),
    }
}

fn parse_number(s: &str, pos: usize) -> Option<(f64, usize)> {
    let bytes = s.as_bytes();
    let mut end = pos;
    let mut saw_digit = false;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        saw_digit = true;
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            saw_digit = true;
            end += 1;
        }
    }
    if !saw_digit {
        return None;
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        end += 1;
        if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
            end += 1;
        }
        let digits = end;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if digits == end {
            return None;
        }
    }
    s[pos..end].parse::<f64>().ok().map(|v| (v, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "(
  (define-fun n0_0 () Real
    1.5)
  (define-fun n0_1 () Real (- 3.0))
  (define-fun p1_0 () Real (/ 7.0 2.0))
  (define-fun n2_0 () Real (- (/ 1.0 4.0)))
)";

    #[test]
    fn test_parse_model_values() {
        let map = parse_model_to_map(MODEL).unwrap();
        assert_eq!(map.len(), 4);
        assert_eq!(map["n0_0"], 1.5);
        assert_eq!(map["n0_1"], -3.0);
        assert_eq!(map["p1_0"], 3.5);
        assert_eq!(map["n2_0"], -0.25);
    }

    #[test]
    fn test_parse_model_in_requested_order() {
        assert_eq!(parse_model(MODEL, &["n0_1", "n0_0"]), Some(vec![-3.0, 1.5]));
        assert_eq!(parse_model(MODEL, &["n0_0", "missing"]), None);
        assert_eq!(parse_model(MODEL, &[]), Some(vec![]));
    }

    #[test]
    fn test_parse_error_and_empty_models() {
        assert!(parse_model_to_map("(error \"line 9 column 10: model is not available\")").is_none());
        assert_eq!(parse_model_to_map("(\n)").map(|m| m.len()), Some(0));
    }

    #[test]
    fn test_integer_sorted_values() {
        let map = parse_model_to_map("((define-fun k () Int 7) (define-fun j () Int (- 2)))").unwrap();
        assert_eq!(map["k"], 7.0);
        assert_eq!(map["j"], -2.0);
    }

    #[test]
    fn test_value_literals() {
        assert_eq!(parse_value_literal("2"), Some(2.0));
        assert_eq!(parse_value_literal(" (- 0.5) "), Some(-0.5));
        assert_eq!(parse_value_literal("(/ 1.0 8.0)"), Some(0.125));
        assert_eq!(parse_value_literal("1e3"), Some(1000.0));
        assert_eq!(parse_value_literal("-4.0"), Some(-4.0));
        assert_eq!(parse_value_literal("(- 5.0 2.0)"), Some(3.0));
        assert_eq!(parse_value_literal("oo"), None);
        assert_eq!(parse_value_literal("(* (- 1.0) oo)"), None);
        assert_eq!(parse_value_literal("1.0 2.0"), None);
    }
}
