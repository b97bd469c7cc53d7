//! Filters and tests registered by [`Registry::new`](crate::Registry::new).

use crate::{Registry, Value, error::EvalResult};

pub(crate) fn register(registry: &mut Registry) {
    registry
        .add_test("defined", |value, _| Ok(!value.is_undefined()))
        .add_test("undefined", |value, _| Ok(value.is_undefined()))
        .add_test("divisibleby", divisible_by)
        .add_test("even", |value, _| {
            Ok(value.as_f64().is_some_and(|n| (n as i64) % 2 == 0))
        })
        .add_test("odd", |value, _| {
            Ok(value.as_f64().is_some_and(|n| (n as i64) % 2 != 0))
        })
        .add_test("iterable", |value, _| Ok(value.is_iterable()))
        .add_test("null", |value, _| Ok(value.is_null()))
        .add_test("number", |value, _| Ok(value.as_f64().is_some()))
        .add_test("string", |value, _| Ok(value.is_string()));

    registry
        .add_filter("raw", |value, _| Ok(Value::Raw(value.to_string())))
        .add_filter("abs", abs)
        .add_filter("attr", |value, args| {
            Ok(attribute(value, &string_arg(args, 0).unwrap_or_default()))
        })
        .add_filter("capitalize", |value, _| Ok(Value::from(capitalize(&value.to_string()))))
        .add_filter("default", default)
        .add_filter("filesizeformat", file_size_format)
        .add_filter("first", |value, args| Ok(take(value, args, End::Front)))
        .add_filter("last", |value, args| Ok(take(value, args, End::Back)))
        .add_filter("join", join)
        .add_filter("split", split)
        .add_filter("length", |value, _| Ok(length(value)))
        .add_filter("count", |value, _| Ok(length(value)))
        .add_filter("lower", |value, _| Ok(Value::from(value.to_string().to_lowercase())))
        .add_filter("upper", |value, _| Ok(Value::from(value.to_string().to_uppercase())))
        .add_filter("trim", |value, _| Ok(Value::from(value.to_string().trim())))
        .add_filter("title", |value, _| Ok(Value::from(title(&value.to_string()))))
        .add_filter("replace", replace)
        .add_filter("reverse", |value, _| Ok(reverse(value)))
        .add_filter("round", round)
        .add_filter("sum", sum)
        .add_filter("truncate", truncate);
}

fn number_arg(args: &[Value], index: usize) -> Option<f64> {
    args.get(index).and_then(Value::as_f64)
}

fn string_arg(args: &[Value], index: usize) -> Option<String> {
    args.get(index).map(ToString::to_string)
}

fn divisible_by(value: &Value, args: &[Value]) -> EvalResult<bool> {
    let (Some(n), Some(divisor)) = (value.as_f64(), number_arg(args, 0)) else {
        return Ok(false);
    };
    let divisor = divisor as i64;
    Ok(divisor != 0 && (n as i64).checked_rem(divisor) == Some(0))
}

fn abs(value: &Value, _: &[Value]) -> EvalResult<Value> {
    if let Value::Int(i) = value {
        return Ok(i
            .checked_abs()
            .map_or(Value::Float((*i as f64).abs()), Value::Int));
    }
    Ok(value
        .as_f64()
        .map_or_else(|| value.clone(), |n| Value::Float(n.abs())))
}

fn attribute(value: &Value, name: &str) -> Value {
    if let Value::Map(map) = value {
        map.get(name).cloned().unwrap_or(Value::Null)
    } else {
        Value::Null
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Upper-case the first letter of every word.
fn title(s: &str) -> String {
    let mut previous_is_word = false;
    s.chars()
        .flat_map(|c| {
            let upper = !previous_is_word;
            previous_is_word = c.is_alphanumeric() || c == '_' || c == '\'';
            if upper {
                c.to_uppercase().collect::<Vec<_>>()
            } else {
                vec![c]
            }
        })
        .collect()
}

/// `default(fallback, boolean)`: replace null/undefined values, or any falsy value when
/// `boolean` is true.
fn default(value: &Value, args: &[Value]) -> EvalResult<Value> {
    let fallback = args.first().cloned().unwrap_or_else(|| Value::from(""));
    let boolean = args.get(1).is_some_and(Value::is_truthy);

    let missing = if boolean {
        !value.is_truthy()
    } else {
        value.is_null() || value.is_undefined()
    };

    Ok(if missing { fallback } else { value.clone() })
}

fn file_size_format(value: &Value, args: &[Value]) -> EvalResult<Value> {
    let Some(size) = value.as_f64() else {
        return Ok(Value::from(value.to_string()));
    };

    let binary = args.first().is_some_and(Value::is_truthy);
    let (base, units) = if binary {
        (1024.0, ["Bytes", "KiB", "MiB", "GiB", "TiB", "PiB"])
    } else {
        (1000.0, ["Bytes", "kB", "MB", "GB", "TB", "PB"])
    };

    if size < base {
        return Ok(Value::from(format!("{size:.0} Bytes")));
    }

    let exponent = ((size.ln() / f64::ln(base)) as usize).min(units.len().saturating_sub(1));
    let scaled = size / base.powi(exponent as i32);
    let unit = units.get(exponent).copied().unwrap_or_default();
    Ok(Value::from(format!("{scaled:.1} {unit}")))
}

#[derive(Clone, Copy)]
enum End {
    Front,
    Back,
}

/// `first(n)` / `last(n)`: a single element when `n` is 1, otherwise a sub-sequence.
fn take(value: &Value, args: &[Value], end: End) -> Value {
    let Some(items) = value.as_seq() else {
        return value.clone();
    };
    let count = number_arg(args, 0).map_or(1, |n| n.max(0.0) as usize);

    if count >= items.len() {
        return value.clone();
    }

    let picked = match end {
        End::Front => items.get(..count),
        End::Back => items.get(items.len().saturating_sub(count)..),
    }
    .unwrap_or_default();

    match picked {
        [single] if count == 1 => single.clone(),
        _ => Value::Seq(picked.to_vec()),
    }
}

fn join(value: &Value, args: &[Value]) -> EvalResult<Value> {
    let Some(items) = value.as_seq() else {
        return Ok(Value::from(value.to_string()));
    };
    let separator = string_arg(args, 0).unwrap_or_default();
    let attr = string_arg(args, 1).filter(|a| !a.is_empty());

    let parts: Vec<String> = items
        .iter()
        .map(|item| match &attr {
            Some(name) => attribute(item, name).to_string(),
            None => item.to_string(),
        })
        .collect();

    Ok(Value::from(parts.join(&separator)))
}

fn split(value: &Value, args: &[Value]) -> EvalResult<Value> {
    let s = value.to_string();
    let separator = string_arg(args, 0).unwrap_or_default();

    let parts = if separator.is_empty() {
        s.chars().map(|c| Value::from(c.to_string())).collect()
    } else {
        s.split(separator.as_str()).map(Value::from).collect()
    };

    Ok(Value::Seq(parts))
}

fn length(value: &Value) -> Value {
    let len = match value {
        Value::Seq(items) => items.len(),
        Value::Map(map) => map.len(),
        Value::String(s) | Value::Raw(s) => s.chars().count(),
        Value::Null
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Float(_)
        | Value::Undefined => 0,
    };
    Value::Int(i64::try_from(len).unwrap_or(i64::MAX))
}

/// `replace(old, new, count)`: a negative or missing count replaces every occurrence.
fn replace(value: &Value, args: &[Value]) -> EvalResult<Value> {
    let s = value.to_string();
    let (Some(old), Some(new)) = (string_arg(args, 0), string_arg(args, 1)) else {
        return Ok(Value::from(s));
    };

    let replaced = match number_arg(args, 2) {
        Some(count) if count >= 0.0 => s.replacen(&old, &new, count as usize),
        _ => s.replace(&old, &new),
    };

    Ok(Value::from(replaced))
}

fn reverse(value: &Value) -> Value {
    match value {
        Value::Seq(items) => Value::Seq(items.iter().rev().cloned().collect()),
        Value::String(s) => Value::from(s.chars().rev().collect::<String>()),
        Value::Null
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Float(_)
        | Value::Map(_)
        | Value::Raw(_)
        | Value::Undefined => value.clone(),
    }
}

/// `round(precision, method)`. Methods: `common`/`up` (half away from zero), `down`,
/// `ceil`, `floor`, `even`/`banker`, `odd`, `awayzero` and `tozero`.
fn round(value: &Value, args: &[Value]) -> EvalResult<Value> {
    let Some(n) = value.as_f64() else {
        return Ok(Value::Float(0.0));
    };
    let precision = number_arg(args, 0).map_or(0, |p| p as i32);
    let method = string_arg(args, 1).unwrap_or_else(|| "common".to_owned());

    let multiplier = 10_f64.powi(precision);
    let scaled = n * multiplier;
    let half_towards_zero = || {
        if scaled >= 0.0 {
            (scaled - 0.5).ceil()
        } else {
            (scaled + 0.5).floor()
        }
    };

    let rounded = match method.as_str() {
        "ceil" => scaled.ceil(),
        "floor" => scaled.floor(),
        "down" | "tozero" => half_towards_zero(),
        "even" | "banker" => scaled.round_ties_even(),
        "odd" => {
            let floor = scaled.floor();
            let diff = scaled - floor;
            if diff == 0.5 {
                if (floor as i64) % 2 == 0 { floor + 1.0 } else { floor }
            } else if diff > 0.5 {
                floor + 1.0
            } else {
                floor
            }
        }
        _ => scaled.round(),
    };

    Ok(Value::Float(rounded / multiplier))
}

fn sum(value: &Value, args: &[Value]) -> EvalResult<Value> {
    let Some(items) = value.as_seq() else {
        return Ok(Value::Float(0.0));
    };
    let attr = string_arg(args, 0).filter(|a| !a.is_empty());

    let total = items
        .iter()
        .filter_map(|item| match &attr {
            Some(name) => attribute(item, name).as_f64(),
            None => item.as_f64(),
        })
        .sum();

    Ok(Value::Float(total))
}

/// `truncate(length, end)`: cut to `length` characters including the `end` marker.
fn truncate(value: &Value, args: &[Value]) -> EvalResult<Value> {
    let s = value.to_string();
    let length = number_arg(args, 0).map_or(255, |l| l.max(0.0) as usize);
    let end = string_arg(args, 1).unwrap_or_else(|| "...".to_owned());

    if s.chars().count() <= length {
        return Ok(Value::from(s));
    }

    let keep = length.saturating_sub(end.chars().count());
    let mut truncated: String = s.chars().take(keep).collect();
    truncated.push_str(&end);
    Ok(Value::from(truncated))
}
