//! Builtin template functions.

use std::borrow::Cow;

use crate::format::{display, sprint, sprintf, sprintln};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    And,
    Or,
    Not,
    Len,
    Index,
    Slice,
    Print,
    Printf,
    Println,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Html,
    Js,
    Urlquery,
    Call,
}

/// Parameter shape of a builtin: `fixed` leading parameters, optionally
/// followed by a variadic tail.
#[derive(Debug, Clone, Copy)]
pub struct Arity {
    pub fixed: usize,
    pub variadic: bool,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "and" => Builtin::And,
            "or" => Builtin::Or,
            "not" => Builtin::Not,
            "len" => Builtin::Len,
            "index" => Builtin::Index,
            "slice" => Builtin::Slice,
            "print" => Builtin::Print,
            "printf" => Builtin::Printf,
            "println" => Builtin::Println,
            "eq" => Builtin::Eq,
            "ne" => Builtin::Ne,
            "lt" => Builtin::Lt,
            "le" => Builtin::Le,
            "gt" => Builtin::Gt,
            "ge" => Builtin::Ge,
            "html" => Builtin::Html,
            "js" => Builtin::Js,
            "urlquery" => Builtin::Urlquery,
            "call" => Builtin::Call,
            _ => return None,
        })
    }

    pub fn arity(self) -> Arity {
        let (fixed, variadic) = match self {
            Builtin::And | Builtin::Or => (1, true),
            Builtin::Not | Builtin::Len => (1, false),
            Builtin::Index | Builtin::Slice | Builtin::Printf | Builtin::Eq | Builtin::Call => {
                (1, true)
            }
            Builtin::Print | Builtin::Println | Builtin::Html | Builtin::Js | Builtin::Urlquery => {
                (0, true)
            }
            Builtin::Ne | Builtin::Lt | Builtin::Le | Builtin::Gt | Builtin::Ge => (2, false),
        };
        Arity { fixed, variadic }
    }

    /// How the argument at `index` is converted before the call.
    pub fn param(self, index: usize) -> Param {
        match self {
            Builtin::Printf if index == 0 => Param::Str,
            Builtin::Printf
            | Builtin::Print
            | Builtin::Println
            | Builtin::Html
            | Builtin::Js
            | Builtin::Urlquery => Param::Any,
            _ => Param::Value,
        }
    }
}

/// Parameter types of builtins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Receives the value untouched, including a missing value.
    Value,
    /// Receives any value; a missing value arrives as nil.
    Any,
    /// Must be a string.
    Str,
}

pub fn is_builtin(name: &str) -> bool {
    Builtin::lookup(name).is_some()
}

/// Invokes a builtin on already-evaluated arguments. `and` and `or` are
/// evaluated lazily by the executor and never reach this function.
/// `callee` is the source text of the first argument, used by `call`.
pub fn invoke<'d>(builtin: Builtin, args: Vec<Value<'d>>, callee: &str) -> Result<Value<'d>, String> {
    let mut args = args;
    match builtin {
        Builtin::And | Builtin::Or => Ok(args.pop().unwrap_or(Value::Missing)),
        Builtin::Not => Ok(Value::Bool(!args[0].is_true())),
        Builtin::Len => length(&args[0]).map(Value::Int),
        Builtin::Index => {
            let item = args.remove(0);
            index(item, args)
        }
        Builtin::Slice => {
            let item = args.remove(0);
            slice(item, &args)
        }
        Builtin::Print => Ok(sprint(&args).into()),
        Builtin::Println => Ok(sprintln(&args).into()),
        Builtin::Printf => {
            let format = match args.remove(0) {
                Value::Str(s) => s,
                other => Cow::Owned(display(&other)),
            };
            Ok(sprintf(&format, &args).into())
        }
        Builtin::Eq => eq(&args[0], &args[1..]).map(Value::Bool),
        Builtin::Ne => eq(&args[0], &args[1..2]).map(|b| Value::Bool(!b)),
        Builtin::Lt => lt(&args[0], &args[1]).map(Value::Bool),
        Builtin::Le => le(&args[0], &args[1]).map(Value::Bool),
        Builtin::Gt => le(&args[0], &args[1]).map(|b| Value::Bool(!b)),
        Builtin::Ge => lt(&args[0], &args[1]).map(|b| Value::Bool(!b)),
        Builtin::Html => Ok(html_escape(&eval_args(&args)).into()),
        Builtin::Js => Ok(js_escape(&eval_args(&args)).into()),
        Builtin::Urlquery => Ok(url_query_escape(&eval_args(&args)).into()),
        Builtin::Call => {
            if args[0].is_nil_like() {
                Err("call of nil".to_string())
            } else {
                Err(format!(
                    "non-function {callee} of type {}",
                    args[0].type_name()
                ))
            }
        }
    }
}

fn length(item: &Value<'_>) -> Result<i64, String> {
    match item {
        Value::Missing => Err("len of untyped nil".to_string()),
        Value::Nil => Err("len of nil pointer".to_string()),
        Value::Str(s) => Ok(s.len() as i64),
        Value::Seq(items) => Ok(items.len() as i64),
        Value::Map(map) => Ok(map.len() as i64),
        other => Err(format!("len of type {}", other.type_name())),
    }
}

fn index_arg(index: &Value<'_>, cap: usize) -> Result<usize, String> {
    let x = match index {
        Value::Int(x) => *x,
        Value::Missing | Value::Nil => {
            return Err("cannot index slice/array with nil".to_string());
        }
        other => {
            return Err(format!(
                "cannot index slice/array with type {}",
                other.type_name()
            ));
        }
    };
    match usize::try_from(x) {
        Ok(i) if i <= cap => Ok(i),
        _ => Err(format!("index out of range: {x}")),
    }
}

fn index<'d>(item: Value<'d>, indexes: Vec<Value<'d>>) -> Result<Value<'d>, String> {
    if item.is_nil_like() {
        return Err("index of untyped nil".to_string());
    }
    let mut item = item;
    for idx in &indexes {
        item = match item {
            Value::Missing | Value::Nil => return Err("index of nil pointer".to_string()),
            Value::Seq(items) => {
                let i = index_arg(idx, items.len())?;
                let elem = items.get(i).ok_or_else(|| format!("index out of range: {i}"))?;
                Value::from_json(elem)
            }
            Value::Str(ref s) => {
                let i = index_arg(idx, s.len())?;
                let byte = s.as_bytes().get(i).ok_or_else(|| format!("index out of range: {i}"))?;
                Value::Int(i64::from(*byte))
            }
            Value::Map(map) => {
                let key = match idx {
                    Value::Str(key) => key,
                    Value::Missing | Value::Nil => {
                        return Err("value is nil; should be of type string".to_string());
                    }
                    other => {
                        return Err(format!(
                            "value has type {}; should be string",
                            other.type_name()
                        ));
                    }
                };
                map.get(&**key).map_or(Value::Nil, Value::from_json)
            }
            other => {
                return Err(format!("can't index item of type {}", other.type_name()));
            }
        };
    }
    Ok(item)
}

fn slice<'d>(item: Value<'d>, indexes: &[Value<'d>]) -> Result<Value<'d>, String> {
    if item.is_nil_like() {
        return Err("slice of untyped nil".to_string());
    }
    if indexes.len() > 3 {
        return Err(format!("too many slice indexes: {}", indexes.len()));
    }
    let len = match &item {
        Value::Str(s) => {
            if indexes.len() == 3 {
                return Err("cannot 3-index slice a string".to_string());
            }
            s.len()
        }
        Value::Seq(items) => items.len(),
        other => return Err(format!("can't slice item of type {}", other.type_name())),
    };
    let mut idx = [0, len, len];
    for (i, index) in indexes.iter().enumerate() {
        idx[i] = index_arg(index, len)?;
    }
    if idx[0] > idx[1] {
        return Err(format!("invalid slice index: {} > {}", idx[0], idx[1]));
    }
    if indexes.len() == 3 && idx[1] > idx[2] {
        return Err(format!("invalid slice index: {} > {}", idx[1], idx[2]));
    }
    Ok(match item {
        Value::Str(s) => match s {
            Cow::Borrowed(b) => match b.get(idx[0]..idx[1]) {
                Some(sub) => Value::Str(Cow::Borrowed(sub)),
                None => String::from_utf8_lossy(&b.as_bytes()[idx[0]..idx[1]])
                    .into_owned()
                    .into(),
            },
            Cow::Owned(o) => String::from_utf8_lossy(&o.as_bytes()[idx[0]..idx[1]])
                .into_owned()
                .into(),
        },
        Value::Seq(items) => Value::Seq(&items[idx[0]..idx[1]]),
        other => other,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bool,
    Int,
    Float,
    Str,
}

fn basic_kind(v: &Value<'_>) -> Option<Kind> {
    match v {
        Value::Bool(_) => Some(Kind::Bool),
        Value::Int(_) => Some(Kind::Int),
        Value::Float(_) => Some(Kind::Float),
        Value::Str(_) => Some(Kind::Str),
        _ => None,
    }
}

fn same_shape(a: &Value<'_>, b: &Value<'_>) -> bool {
    a.is_nil_like()
        || b.is_nil_like()
        || std::mem::discriminant(a) == std::mem::discriminant(b)
}

pub fn eq(arg1: &Value<'_>, rest: &[Value<'_>]) -> Result<bool, String> {
    if rest.is_empty() {
        return Err("missing argument for comparison".to_string());
    }
    let k1 = basic_kind(arg1);
    for arg in rest {
        let k2 = basic_kind(arg);
        let truth = if k1 != k2 {
            if !arg1.is_nil_like() && !arg.is_nil_like() {
                return Err("incompatible types for comparison".to_string());
            }
            false
        } else {
            match (arg1, arg) {
                (Value::Bool(a), Value::Bool(b)) => a == b,
                (Value::Int(a), Value::Int(b)) => a == b,
                (Value::Float(a), Value::Float(b)) => a == b,
                (Value::Str(a), Value::Str(b)) => a == b,
                _ => {
                    if !same_shape(arg1, arg) {
                        return Err(format!(
                            "non-comparable types {}: {}, {}: {}",
                            display(arg1),
                            arg1.type_name(),
                            arg.type_name(),
                            display(arg)
                        ));
                    }
                    if arg1.is_nil_like() || arg.is_nil_like() {
                        arg1.is_nil_like() == arg.is_nil_like()
                    } else {
                        return Err(format!(
                            "non-comparable type {}: {}",
                            display(arg),
                            arg.type_name()
                        ));
                    }
                }
            }
        };
        if truth {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn lt(arg1: &Value<'_>, arg2: &Value<'_>) -> Result<bool, String> {
    let bad_type = || "invalid type for comparison".to_string();
    let k1 = basic_kind(arg1).ok_or_else(bad_type)?;
    let k2 = basic_kind(arg2).ok_or_else(bad_type)?;
    if k1 != k2 {
        return Err("incompatible types for comparison".to_string());
    }
    match (arg1, arg2) {
        (Value::Int(a), Value::Int(b)) => Ok(a < b),
        (Value::Float(a), Value::Float(b)) => Ok(a < b),
        (Value::Str(a), Value::Str(b)) => Ok(a < b),
        _ => Err(bad_type()),
    }
}

pub fn le(arg1: &Value<'_>, arg2: &Value<'_>) -> Result<bool, String> {
    if lt(arg1, arg2)? {
        return Ok(true);
    }
    eq(arg1, std::slice::from_ref(arg2))
}

/// Stringifies escaper arguments: a lone string passes through, anything
/// else is printed with missing values shown as `<no value>`.
fn eval_args(args: &[Value<'_>]) -> String {
    if let [Value::Str(s)] = args {
        return s.to_string();
    }
    let printable: Vec<Value<'_>> = args
        .iter()
        .map(|arg| {
            if arg.is_nil_like() {
                Value::Str(Cow::Borrowed("<no value>"))
            } else {
                arg.clone()
            }
        })
        .collect();
    sprint(&printable)
}

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\0' => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
    out
}

pub fn js_escape(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '&' => out.push_str("\\u0026"),
            '=' => out.push_str("\\u003D"),
            c if (c as u32) < 0x20 => {
                let b = c as u8;
                out.push_str("\\u00");
                out.push(HEX[usize::from(b >> 4)] as char);
                out.push(HEX[usize::from(b & 0xF)] as char);
            }
            c if c.is_ascii() || crate::format::is_print(c) => out.push(c),
            c => out.push_str(&format!("\\u{:04X}", c as u32)),
        }
    }
    out
}

pub fn url_query_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            b => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn s(text: &str) -> Value<'_> {
        Value::Str(Cow::Borrowed(text))
    }

    #[test]
    fn escapers() {
        assert_eq!(html_escape(r#"<a href="x">&'"#), "&lt;a href=&#34;x&#34;&gt;&amp;&#39;");
        assert_eq!(js_escape("a'b<c>\n"), "a\\'b\\u003Cc\\u003E\\u000A");
        assert_eq!(url_query_escape("a b&c=d/é"), "a+b%26c%3Dd%2F%C3%A9");
    }

    #[test]
    fn comparisons() {
        assert_eq!(eq(&Value::Int(1), &[Value::Int(2), Value::Int(1)]), Ok(true));
        assert_eq!(eq(&s("a"), &[s("b")]), Ok(false));
        assert_eq!(eq(&Value::Nil, &[Value::Missing]), Ok(true));
        assert_eq!(
            eq(&Value::Float(1.0), &[Value::Int(1)]),
            Err("incompatible types for comparison".to_string())
        );
        assert_eq!(lt(&s("a"), &s("b")), Ok(true));
        assert_eq!(
            lt(&Value::Bool(true), &Value::Bool(false)),
            Err("invalid type for comparison".to_string())
        );
        assert_eq!(le(&Value::Int(2), &Value::Int(2)), Ok(true));
    }

    #[test]
    fn index_walks_nested_data() {
        let doc = json!({"a": [10, {"b": "x"}]});
        let root = Value::from_json(&doc);
        let got = index(root.clone(), vec![s("a"), Value::Int(1), s("b")]).expect("index");
        assert_eq!(got, s("x"));
        assert_eq!(
            index(root.clone(), vec![s("a"), Value::Int(5)]),
            Err("index out of range: 5".to_string())
        );
        assert_eq!(index(root, vec![s("zz")]), Ok(Value::Nil));
    }

    #[test]
    fn slice_strings_and_sequences() {
        assert_eq!(slice(s("hello"), &[Value::Int(1), Value::Int(3)]), Ok(s("el")));
        let doc = json!([1, 2, 3]);
        let Ok(Value::Seq(items)) = slice(Value::from_json(&doc), &[Value::Int(1)]) else {
            panic!("expected seq");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(
            slice(s("abc"), &[Value::Int(2), Value::Int(1)]),
            Err("invalid slice index: 2 > 1".to_string())
        );
    }
}
