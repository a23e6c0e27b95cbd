//! Canonical JSON encoding (RFC 8785 profile).
//!
//! Rules, fixed across every implementation that must agree on node ids:
//!
//! - object keys sorted by code point, no duplicate keys (a JSON object
//!   cannot carry them once decoded)
//! - no insignificant whitespace
//! - integers in minimal decimal form; other finite numbers in the shortest
//!   round-trip form using ECMAScript `Number.prototype.toString` layout
//!   (exponent form below `1e-6` and from `1e21`)
//! - strings: `\"` `\\` `\b` `\f` `\n` `\r` `\t` escaped, other control
//!   characters as `\u00xx` with lowercase hex, everything else literal UTF-8

use serde_json::{Number, Value};

use crate::error::CasError;

/// Integral floats with magnitude below this are written as integers.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Encode a JSON value canonically.
pub fn canonicalize(value: &Value) -> Result<Vec<u8>, CasError> {
    let mut out = Vec::with_capacity(256);
    write_value(&mut out, value)?;
    Ok(out)
}

/// Canonical form as a `String` (always valid UTF-8).
pub fn canonical_string(value: &Value) -> Result<String, CasError> {
    let bytes = canonicalize(value)?;
    String::from_utf8(bytes).map_err(|_| CasError::Internal("canonical output is not UTF-8".into()))
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> Result<(), CasError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => write_number(out, n)?,
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(out, key);
                out.push(b':');
                write_value(out, item)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_number(out: &mut Vec<u8>, n: &Number) -> Result<(), CasError> {
    if let Some(u) = n.as_u64() {
        out.extend_from_slice(u.to_string().as_bytes());
        return Ok(());
    }
    if let Some(i) = n.as_i64() {
        out.extend_from_slice(i.to_string().as_bytes());
        return Ok(());
    }
    let f = n.as_f64().ok_or(CasError::NonFiniteNumber)?;
    out.extend_from_slice(format_f64(f)?.as_bytes());
    Ok(())
}

/// ECMAScript-style shortest round-trip rendering of a finite double.
fn format_f64(f: f64) -> Result<String, CasError> {
    if !f.is_finite() {
        return Err(CasError::NonFiniteNumber);
    }
    if f == 0.0 {
        return Ok("0".to_string());
    }
    if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER {
        return Ok(format!("{}", f as i64));
    }

    // `{:e}` yields the shortest round-trip digits: "d.ddddde-7".
    let sci = format!("{:e}", f.abs());
    let (mantissa, exponent) = sci
        .split_once('e')
        .ok_or_else(|| CasError::Internal(format!("unexpected float form {sci}")))?;
    let exponent: i32 = exponent
        .parse()
        .map_err(|_| CasError::Internal(format!("unexpected float exponent {sci}")))?;
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    let n = exponent + 1;

    let mut s = String::new();
    if f < 0.0 {
        s.push('-');
    }
    if k <= n && n <= 21 {
        s.push_str(&digits);
        s.extend(std::iter::repeat_n('0', (n - k) as usize));
    } else if 0 < n && n <= 21 {
        s.push_str(&digits[..n as usize]);
        s.push('.');
        s.push_str(&digits[n as usize..]);
    } else if -6 < n && n <= 0 {
        s.push_str("0.");
        s.extend(std::iter::repeat_n('0', (-n) as usize));
        s.push_str(&digits);
    } else {
        s.push_str(&digits[..1]);
        if k > 1 {
            s.push('.');
            s.push_str(&digits[1..]);
        }
        s.push('e');
        s.push(if n - 1 >= 0 { '+' } else { '-' });
        s.push_str(&(n - 1).abs().to_string());
    }
    Ok(s)
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    out.push(b'"');
    for ch in s.chars() {
        match ch {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\u{08}' => out.extend_from_slice(b"\\b"),
            '\u{0c}' => out.extend_from_slice(b"\\f"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                let b = c as u8;
                out.extend_from_slice(b"\\u00");
                out.push(HEX[(b >> 4) as usize]);
                out.push(HEX[(b & 0x0f) as usize]);
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

// ============================================================================
// Tests
// ============================================================================
