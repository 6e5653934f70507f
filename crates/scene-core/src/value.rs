//! Loose value semantics
//!
//! Points are written by many different adapters and the same logical value
//! shows up in different representations: a switch may report `true`, `1` or
//! `"true"`. Scene evaluation compares observed values against configured
//! targets with the tolerant rules in this module instead of strict JSON
//! equality.
//!
//! | left      | right       | rule                                        |
//! |-----------|-------------|---------------------------------------------|
//! | null      | null        | equal                                       |
//! | null      | anything    | not equal                                   |
//! | bool      | number      | `true` is `1`, `false` is `0`               |
//! | bool      | string      | `"true"`/`"false"` (any case) or `"1"`/`"0"` |
//! | number    | string      | string parsed as a finite float             |
//! | same type | same type   | value equality (numbers compared as floats) |

use serde_json::Value;

/// Render a value the way it is shown to trigger comparisons
///
/// Integral floats are printed without a fractional part so that `10.0`
/// and `10` have the same string form. `null` renders as the empty string.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                let f = n.as_f64().unwrap_or(0.0);
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    (f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
        }
        _ => value.to_string(),
    }
}

/// Parse a string as a finite float
///
/// Surrounding whitespace is ignored. `NaN` and infinities are rejected.
pub fn parse_finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

fn bool_from_str(s: &str) -> Option<bool> {
    let trimmed = s.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return Some(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Some(false);
    }
    match parse_finite(trimmed) {
        Some(f) if f == 1.0 => Some(true),
        Some(f) if f == 0.0 => Some(false),
        _ => None,
    }
}

/// Tolerant equality across bool, number and string representations
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(flag), Value::Number(n)) | (Value::Number(n), Value::Bool(flag)) => {
            n.as_f64() == Some(if *flag { 1.0 } else { 0.0 })
        }
        (Value::Bool(flag), Value::String(s)) | (Value::String(s), Value::Bool(flag)) => {
            bool_from_str(s) == Some(*flag)
        }
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            match (parse_finite(s), n.as_f64()) {
                (Some(parsed), Some(number)) => parsed == number,
                _ => false,
            }
        }
        _ => a == b,
    }
}

/// Interpret a value as an activation direction
///
/// `null`, `false`, `0`, the empty string and the strings `"false"` / `"0"`
/// are falsy; everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("false") {
                return false;
            }
            if trimmed.eq_ignore_ascii_case("true") {
                return true;
            }
            parse_finite(trimmed).map(|f| f != 0.0).unwrap_or(true)
        }
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Parse a string that is the canonical rendering of a finite float
///
/// Only strings that [`value_to_string`] would produce for the parsed number
/// are accepted: `"10"` and `"-2.5"` are, `"10.0"`, `" 5"` and `"1e3"` are not.
pub fn parse_canonical(s: &str) -> Option<f64> {
    let parsed = s.parse::<f64>().ok().filter(|f| f.is_finite())?;
    let rendered = serde_json::Number::from_f64(parsed)
        .map(|n| value_to_string(&Value::Number(n)))?;
    (rendered == s).then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_loose_eq_truth_table() {
        let cases = [
            (json!(null), json!(null), true),
            (json!(null), json!(false), false),
            (json!(null), json!(0), false),
            (json!(null), json!(""), false),
            (json!(true), json!(true), true),
            (json!(true), json!(false), false),
            (json!(true), json!(1), true),
            (json!(true), json!(1.0), true),
            (json!(true), json!(2), false),
            (json!(false), json!(0), true),
            (json!(true), json!("true"), true),
            (json!(true), json!("TRUE"), true),
            (json!(true), json!("1"), true),
            (json!(false), json!("false"), true),
            (json!(false), json!("0"), true),
            (json!(false), json!(""), false),
            (json!(true), json!("yes"), false),
            (json!(1), json!("1"), true),
            (json!(28.54), json!("28.54"), true),
            (json!(1), json!(" 1 "), true),
            (json!(1), json!("abc"), false),
            (json!(0), json!(""), false),
            (json!(3), json!(3.0), true),
            (json!("on"), json!("on"), true),
            (json!("on"), json!("ON"), false),
            (json!([1, 2]), json!([1, 2]), true),
        ];

        for (a, b, expected) in cases {
            assert_eq!(loose_eq(&a, &b), expected, "{} == {}", a, b);
            assert_eq!(loose_eq(&b, &a), expected, "{} == {} (swapped)", b, a);
        }
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!(null)), "");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&json!(10)), "10");
        assert_eq!(value_to_string(&json!(10.0)), "10");
        assert_eq!(value_to_string(&json!(-2.5)), "-2.5");
        assert_eq!(value_to_string(&json!("abc")), "abc");
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!(-3.5)));
        assert!(is_truthy(&json!("true")));
        assert!(is_truthy(&json!("on")));
        assert!(is_truthy(&json!("2")));

        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!("false")));
        assert!(!is_truthy(&json!("0")));
    }

    #[test]
    fn test_parse_canonical() {
        assert_eq!(parse_canonical("10"), Some(10.0));
        assert_eq!(parse_canonical("-2.5"), Some(-2.5));
        assert_eq!(parse_canonical("0.1"), Some(0.1));

        assert_eq!(parse_canonical("10.0"), None);
        assert_eq!(parse_canonical("5.50"), None);
        assert_eq!(parse_canonical(" 5"), None);
        assert_eq!(parse_canonical("+5"), None);
        assert_eq!(parse_canonical("abc"), None);
        assert_eq!(parse_canonical("NaN"), None);
        assert_eq!(parse_canonical(""), None);
    }

    #[test]
    fn test_parse_finite() {
        assert_eq!(parse_finite(" 4.5 "), Some(4.5));
        assert_eq!(parse_finite("inf"), None);
        assert_eq!(parse_finite("NaN"), None);
        assert_eq!(parse_finite(""), None);
    }
}
