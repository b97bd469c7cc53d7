//! Parsing of the `expr|filter(args)|... is [not] test(args)` pipeline found in variable
//! tags, conditions and loop sources.

use crate::{Context, Value, error::EvalResult};

/// Split `input` on `separator`, ignoring separators inside double-quoted strings.
///
/// When splitting on `|`, the logical operator `||` is never treated as a separator. With a
/// `limit`, at most `limit` pieces are produced and the last one holds the remainder.
pub(crate) fn split_unquoted(input: &str, separator: char, limit: Option<usize>) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if quoted {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                quoted = false;
            }
            continue;
        }

        if c == '"' {
            quoted = true;
        } else if c == separator {
            if separator == '|' && chars.peek().is_some_and(|&(_, next)| next == '|') {
                chars.next();
                continue;
            }
            if limit.is_some_and(|limit| parts.len().saturating_add(1) >= limit) {
                break;
            }
            parts.push(input.get(start..i).unwrap_or_default());
            start = i.saturating_add(c.len_utf8());
        }
    }

    parts.push(input.get(start..).unwrap_or_default());
    parts
}

/// Find the byte offset of `needle` in `input` outside double-quoted strings.
fn find_unquoted(input: &str, needle: &str) -> Option<usize> {
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if quoted {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                quoted = false;
            }
        } else if c == '"' {
            quoted = true;
        } else if input.get(i..).is_some_and(|rest| rest.starts_with(needle)) {
            return Some(i);
        }
    }

    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallKind {
    Filter,
    Test { negated: bool },
}

/// One `name(args)` step of a pipeline. Arguments are kept as source text and evaluated
/// against the context at render time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Call<'a> {
    pub(crate) name: &'a str,
    pub(crate) args: Vec<&'a str>,
    pub(crate) kind: CallKind,
}

impl<'a> Call<'a> {
    fn parse(source: &'a str, kind: CallKind) -> Self {
        let source = source.trim();
        let source = source.strip_suffix(')').unwrap_or(source);
        let mut pieces = split_unquoted(source, '(', Some(2)).into_iter();
        let name = pieces.next().unwrap_or_default().trim();
        let args = pieces
            .next()
            .filter(|args| !args.trim().is_empty())
            .map(|args| {
                split_unquoted(args, ',', None)
                    .into_iter()
                    .map(str::trim)
                    .collect()
            })
            .unwrap_or_default();

        Self { name, args, kind }
    }

    /// Evaluate the call's argument list against `context`.
    pub(crate) fn arguments(&self, context: &Context) -> EvalResult<Vec<Value>> {
        self.args
            .iter()
            .map(|arg| parse_argument(arg, context))
            .collect()
    }
}

/// A tag expression split into its leading expression and the calls applied to its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pipeline<'a> {
    pub(crate) expression: &'a str,
    pub(crate) calls: Vec<Call<'a>>,
}

impl<'a> Pipeline<'a> {
    pub(crate) fn parse(source: &'a str) -> Self {
        let (left, test) = match find_unquoted(source, " is ") {
            Some(index) => {
                let left = source.get(..index).unwrap_or_default();
                let right = source.get(index.saturating_add(4)..).unwrap_or_default();
                (left, Some(right.trim()))
            }
            None => (source, None),
        };

        let mut parts = split_unquoted(left, '|', None).into_iter();
        let expression = parts.next().unwrap_or_default().trim();
        let mut calls: Vec<_> = parts
            .map(|part| Call::parse(part, CallKind::Filter))
            .collect();

        if let Some(test) = test {
            let (negated, test) = match test.strip_prefix("not ") {
                Some(rest) => (true, rest.trim()),
                None => (false, test),
            };
            calls.push(Call::parse(test, CallKind::Test { negated }));
        }

        Self { expression, calls }
    }

    /// Whether the pipeline ends in a `defined`/`undefined` test, in which case a missing path
    /// evaluates to [`Value::Undefined`] instead of failing.
    pub(crate) fn tests_definedness(&self) -> bool {
        self.calls.last().is_some_and(|call| {
            matches!(call.kind, CallKind::Test { .. })
                && matches!(call.name, "defined" | "undefined")
        })
    }
}

/// Interpret a filter argument: a double-quoted string, `true`/`false`, a number, or a path
/// into the context.
pub(crate) fn parse_argument(arg: &str, context: &Context) -> EvalResult<Value> {
    if arg.len() > 1 && arg.starts_with('"') && arg.ends_with('"') {
        let inner = arg.get(1..arg.len().saturating_sub(1)).unwrap_or_default();
        return Ok(Value::String(unescape(inner)));
    }

    match arg {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }

    if arg
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'))
    {
        if !arg.contains('.') {
            if let Ok(int) = arg.parse::<i64>() {
                return Ok(Value::Int(int));
            }
        }
        if let Ok(float) = arg.parse::<f64>() {
            return Ok(Value::Float(float));
        }
    }

    context.resolve(arg)
}

fn unescape(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            output.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => output.push('\n'),
            Some('t') => output.push('\t'),
            Some('"') => output.push('"'),
            Some('\\') => output.push('\\'),
            Some(other) => {
                output.push('\\');
                output.push(other);
            }
            None => output.push('\\'),
        }
    }

    output
}
