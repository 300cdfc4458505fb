// canonical.rs — Deterministic JSON encoding for signing.
//
// Records are first serialized to a `serde_json::Value` and then written back
// out with object keys sorted by byte value at every nesting level. Arrays
// keep their order. The encoder does not depend on the map ordering
// serde_json happens to be compiled with, so a downstream `preserve_order`
// feature cannot change signatures.
//
// Scalars follow the interop byte form that existing golden vectors were
// signed over:
//
//   numbers  every number is treated as an IEEE-754 double and written in
//            shortest round-trip form; whole values carry no fraction (`1`,
//            not `1.0`) and exponent form is used only outside [1e-6, 1e21)
//            as `1e-7` / `1e+21`
//   strings  `<`, `>`, `&`, U+2028 and U+2029 are written as `\uXXXX`;
//            other control characters use the short escapes where one exists

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{Number, Value};

use crate::error::AttestError;

/// Serialize `record` to canonical JSON bytes.
pub fn canonical_bytes<T: Serialize + ?Sized>(record: &T) -> Result<Vec<u8>, AttestError> {
    Ok(canonical_string(record)?.into_bytes())
}

/// Serialize `record` to a canonical JSON string.
pub fn canonical_string<T: Serialize + ?Sized>(record: &T) -> Result<String, AttestError> {
    let value = serde_json::to_value(record)?;
    let mut out = String::with_capacity(256);
    write_value(&value, &mut out);
    Ok(out)
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        Value::Number(n) => write_number(n, out),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
    }
}

fn write_number(number: &Number, out: &mut String) {
    let Some(f) = number.as_f64() else {
        out.push_str(&number.to_string());
        return;
    };
    let abs = f.abs();
    if abs != 0.0 && !(1e-6..1e21).contains(&abs) {
        let formatted = format!("{:e}", f);
        match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => {
                let _ = write!(out, "{}e+{}", mantissa, exp);
            }
            _ => out.push_str(&formatted),
        }
    } else {
        let _ = write!(out, "{}", f);
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '<' | '>' | '&' | '\u{2028}' | '\u{2029}' => {
                let _ = write!(out, "\\u{:04x}", ch as u32);
            }
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
