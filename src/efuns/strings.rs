//! String efuns, plus the sscanf matcher the interpreter drives.

use itertools::Itertools;

use crate::efuns::arg_str;
use crate::errors::RuntimeError;
use crate::value::Value;

pub fn explode(args: Vec<Value>) -> Result<Value, RuntimeError> {
    let s = arg_str(&args, 0, "explode")?;
    let sep = arg_str(&args, 1, "explode")?;
    if sep.is_empty() {
        return Ok(Value::array(vec![Value::str(s)]));
    }
    let parts: Vec<Value> = s.split(sep.as_str()).map(Value::str).collect();
    Ok(Value::array(parts))
}

pub fn implode(args: Vec<Value>) -> Result<Value, RuntimeError> {
    let items = match args.first() {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Nil) => return Ok(Value::str("")),
        _ => return Err(RuntimeError::typed("implode: first argument must be an array")),
    };
    let sep = arg_str(&args, 1, "implode")?;
    let joined = items
        .borrow()
        .iter()
        .filter_map(|v| match v {
            Value::Str(s) => Some(s.to_string()),
            Value::Int(n) => Some(n.to_string()),
            _ => None,
        })
        .join(&sep);
    Ok(Value::str(joined))
}

/// `%s`, `%d` and `%%`, with optional width and `-` for left alignment.
pub fn sprintf(args: Vec<Value>) -> Result<Value, RuntimeError> {
    let fmt = arg_str(&args, 0, "sprintf")?;
    let mut out = String::new();
    let mut next_arg = 1;
    let mut chars = fmt.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let mut left = false;
        if chars.peek() == Some(&'-') {
            left = true;
            chars.next();
        }
        let mut width = 0usize;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            width = width * 10 + d as usize;
            chars.next();
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(spec @ ('s' | 'd')) => {
                let v = args.get(next_arg).cloned().unwrap_or(Value::Int(0));
                next_arg += 1;
                let text = match (spec, &v) {
                    ('d', v) => v.as_int().unwrap_or(0).to_string(),
                    (_, v) => v.to_write_string(),
                };
                if text.len() >= width {
                    out.push_str(&text);
                } else if left {
                    out.push_str(&text);
                    out.push_str(&" ".repeat(width - text.len()));
                } else {
                    out.push_str(&" ".repeat(width - text.len()));
                    out.push_str(&text);
                }
            }
            Some(other) => {
                return Err(RuntimeError::typed(format!(
                    "sprintf: unknown directive %{}",
                    other
                )))
            }
            None => return Err(RuntimeError::typed("sprintf: trailing %")),
        }
    }
    Ok(Value::str(out))
}

pub fn lower_case(args: Vec<Value>) -> Result<Value, RuntimeError> {
    let s = arg_str(&args, 0, "lower_case")?;
    Ok(Value::str(s.to_lowercase()))
}

pub fn capitalize(args: Vec<Value>) -> Result<Value, RuntimeError> {
    let s = arg_str(&args, 0, "capitalize")?;
    let mut chars = s.chars();
    let out = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    Ok(Value::str(out))
}

pub fn replace_string(args: Vec<Value>) -> Result<Value, RuntimeError> {
    let s = arg_str(&args, 0, "replace_string")?;
    let from = arg_str(&args, 1, "replace_string")?;
    let to = arg_str(&args, 2, "replace_string")?;
    if from.is_empty() {
        return Ok(Value::str(s));
    }
    Ok(Value::str(s.replace(&from, &to)))
}

pub fn trim(args: Vec<Value>) -> Result<Value, RuntimeError> {
    let s = arg_str(&args, 0, "trim")?;
    Ok(Value::str(s.trim()))
}

pub fn strlen(args: Vec<Value>) -> Result<Value, RuntimeError> {
    match args.first() {
        Some(Value::Str(s)) => Ok(Value::Int(s.len() as i64)),
        Some(Value::Nil) | Some(Value::Int(0)) | None => Ok(Value::Int(0)),
        Some(other) => Err(RuntimeError::typed(format!(
            "strlen: got {}",
            other.type_name()
        ))),
    }
}

/// Parse a leading decimal integer, 0 when there is none.
pub fn to_int(args: Vec<Value>) -> Result<Value, RuntimeError> {
    match args.first() {
        Some(Value::Int(n)) => Ok(Value::Int(*n)),
        Some(Value::Str(s)) => {
            let t = s.trim_start();
            let negative = t.starts_with('-');
            let digits: String = t
                .chars()
                .skip(if negative { 1 } else { 0 })
                .take_while(|c| c.is_ascii_digit())
                .collect();
            let n: i64 = digits.parse().unwrap_or(0);
            Ok(Value::Int(if negative { -n } else { n }))
        }
        _ => Ok(Value::Int(0)),
    }
}

/// `member(container, x)`: index in an array (-1 when absent), substring
/// index in a string (-1 when absent), key presence in a mapping (0/1).
pub fn member(args: Vec<Value>) -> Result<Value, RuntimeError> {
    let needle = args.get(1).cloned().unwrap_or(Value::Nil);
    match args.first() {
        Some(Value::Array(items)) => {
            let idx = items.borrow().iter().position(|v| *v == needle);
            Ok(Value::Int(idx.map(|i| i as i64).unwrap_or(-1)))
        }
        Some(Value::Str(hay)) => {
            let Some(sub) = needle.as_str() else {
                return Ok(Value::Int(-1));
            };
            Ok(Value::Int(
                hay.find(sub).map(|i| i as i64).unwrap_or(-1),
            ))
        }
        Some(Value::Mapping(map)) => {
            let key = match needle.into_map_key() {
                Ok(k) => k,
                Err(_) => return Ok(Value::Int(0)),
            };
            Ok(Value::Int(if map.borrow().contains_key(&key) { 1 } else { 0 }))
        }
        _ => Ok(Value::Int(-1)),
    }
}

// ---- sscanf ----

enum FmtPart {
    Lit(String),
    Str,
    Int,
}

fn parse_fmt(fmt: &str) -> Vec<FmtPart> {
    let mut parts = Vec::new();
    let mut lit = String::new();
    let mut chars = fmt.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '%' {
            match chars.next() {
                Some('s') => {
                    if !lit.is_empty() {
                        parts.push(FmtPart::Lit(std::mem::take(&mut lit)));
                    }
                    parts.push(FmtPart::Str);
                }
                Some('d') => {
                    if !lit.is_empty() {
                        parts.push(FmtPart::Lit(std::mem::take(&mut lit)));
                    }
                    parts.push(FmtPart::Int);
                }
                Some('%') => lit.push('%'),
                Some(other) => lit.push(other),
                None => {}
            }
        } else {
            lit.push(ch);
        }
    }
    if !lit.is_empty() {
        parts.push(FmtPart::Lit(lit));
    }
    parts
}

/// Match `input` against `fmt`, returning the converted outputs in order
/// plus one type-zero per conversion spec (for unmatched outputs).
///
/// `%s` before a literal is greedy-last: it swallows everything up to the
/// *final* occurrence of that literal, so `"sword 2 from bag"` against
/// `"%s from %s"` yields `("sword 2", "bag")`. A trailing `%s` takes the
/// rest of the input.
pub fn sscanf_match(input: &str, fmt: &str) -> (Vec<Value>, Vec<Value>) {
    let parts = parse_fmt(fmt);
    let zeros: Vec<Value> = parts
        .iter()
        .filter_map(|p| match p {
            FmtPart::Str => Some(Value::str("")),
            FmtPart::Int => Some(Value::Int(0)),
            FmtPart::Lit(_) => None,
        })
        .collect();

    let mut out = Vec::new();
    let mut pos = 0usize;
    for (idx, part) in parts.iter().enumerate() {
        let rest = &input[pos..];
        match part {
            FmtPart::Lit(lit) => {
                if let Some(stripped) = rest.strip_prefix(lit.as_str()) {
                    pos = input.len() - stripped.len();
                } else {
                    return (out, zeros);
                }
            }
            FmtPart::Int => {
                let negative = rest.starts_with('-');
                let digits: String = rest
                    .chars()
                    .skip(if negative { 1 } else { 0 })
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                if digits.is_empty() {
                    return (out, zeros);
                }
                let n: i64 = digits.parse().unwrap_or(0);
                out.push(Value::Int(if negative { -n } else { n }));
                pos += digits.len() + if negative { 1 } else { 0 };
            }
            FmtPart::Str => match parts.get(idx + 1) {
                Some(FmtPart::Lit(lit)) => match rest.rfind(lit.as_str()) {
                    Some(found) => {
                        out.push(Value::str(&rest[..found]));
                        pos += found;
                    }
                    None => {
                        // no delimiter: consume the rest, the literal
                        // match fails next
                        out.push(Value::str(rest));
                        pos = input.len();
                    }
                },
                _ => {
                    out.push(Value::str(rest));
                    pos = input.len();
                }
            },
        }
    }
    (out, zeros)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(vals: &[Value]) -> Vec<String> {
        vals.iter().map(|v| v.to_write_string()).collect()
    }

    #[test]
    fn test_sscanf_from_greedy_last() {
        let (out, _) = sscanf_match("sword 2 from bag", "%s from %s");
        assert_eq!(strs(&out), vec!["sword 2", "bag"]);

        let (out, _) = sscanf_match("all from corpse", "%s from %s");
        assert_eq!(strs(&out), vec!["all", "corpse"]);
    }

    #[test]
    fn test_sscanf_no_delimiter() {
        let (out, zeros) = sscanf_match("no delimiter here", "%s from %s");
        assert!(out.len() < 2);
        assert_eq!(zeros.len(), 2);
        assert_eq!(zeros[0], Value::str(""));
    }

    #[test]
    fn test_sscanf_ints() {
        let (out, _) = sscanf_match("take 3 coins", "take %d coins");
        assert_eq!(out, vec![Value::Int(3)]);

        let (out, _) = sscanf_match("go -4", "go %d");
        assert_eq!(out, vec![Value::Int(-4)]);

        let (out, _) = sscanf_match("take many coins", "take %d coins");
        assert!(out.is_empty());
    }

    #[test]
    fn test_sscanf_literal_prefix_mismatch() {
        let (out, _) = sscanf_match("put sword in bag", "get %s", );
        assert!(out.is_empty());
    }

    #[test]
    fn test_explode_implode_round_trip() {
        let exploded = explode(vec![Value::str("a:b:c"), Value::str(":")]).unwrap();
        let imploded = implode(vec![exploded, Value::str(":")]).unwrap();
        assert_eq!(imploded, Value::str("a:b:c"));
    }

    #[test]
    fn test_explode_keeps_empty_fields() {
        let v = explode(vec![Value::str("/a/b"), Value::str("/")]).unwrap();
        match v {
            Value::Array(items) => {
                assert_eq!(items.borrow().len(), 3);
                assert_eq!(items.borrow()[0], Value::str(""));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_sprintf() {
        let out = sprintf(vec![
            Value::str("%s has %d hp (%d%%)"),
            Value::str("Kael"),
            Value::Int(42),
            Value::Int(90),
        ])
        .unwrap();
        assert_eq!(out, Value::str("Kael has 42 hp (90%)"));
    }

    #[test]
    fn test_sprintf_width() {
        let out = sprintf(vec![Value::str("[%5d]"), Value::Int(7)]).unwrap();
        assert_eq!(out, Value::str("[    7]"));
        let out = sprintf(vec![Value::str("[%-5s]"), Value::str("ab")]).unwrap();
        assert_eq!(out, Value::str("[ab   ]"));
    }

    #[test]
    fn test_case_helpers() {
        assert_eq!(
            capitalize(vec![Value::str("kael")]).unwrap(),
            Value::str("Kael")
        );
        assert_eq!(
            lower_case(vec![Value::str("KaEl")]).unwrap(),
            Value::str("kael")
        );
        assert_eq!(trim(vec![Value::str("  x ")]).unwrap(), Value::str("x"));
    }

    #[test]
    fn test_to_int() {
        assert_eq!(to_int(vec![Value::str("42nd")]).unwrap(), Value::Int(42));
        assert_eq!(to_int(vec![Value::str("-7")]).unwrap(), Value::Int(-7));
        assert_eq!(to_int(vec![Value::str("x")]).unwrap(), Value::Int(0));
        assert_eq!(to_int(vec![Value::Nil]).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_member() {
        let arr = Value::array(vec![Value::Int(5), Value::str("x")]);
        assert_eq!(member(vec![arr.clone(), Value::str("x")]).unwrap(), Value::Int(1));
        assert_eq!(member(vec![arr, Value::Int(9)]).unwrap(), Value::Int(-1));
        assert_eq!(
            member(vec![Value::str("hello"), Value::str("ll")]).unwrap(),
            Value::Int(2)
        );
    }

    #[test]
    fn test_strlen() {
        assert_eq!(strlen(vec![Value::str("abc")]).unwrap(), Value::Int(3));
        assert_eq!(strlen(vec![Value::Nil]).unwrap(), Value::Int(0));
    }
}
