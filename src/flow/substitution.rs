//! `{name}` placeholder substitution for step texts.
//!
//! Step texts come from the server with inline markup (`<b>`, `<br>`) and
//! placeholders naming facts from [`CompanyData::substitution_context`]. The
//! renderer only touches well-formed `{identifier}` tokens; everything else
//! passes through byte-for-byte.
//!
//! [`CompanyData::substitution_context`]: crate::model::CompanyData::substitution_context

use std::collections::BTreeMap;

use serde_json::Value;

/// Replace `{name}` tokens in `template`.
///
/// `overrides` wins over `context`. Unknown tokens are left as written.
pub fn render(
    template: &str,
    context: &BTreeMap<String, Value>,
    overrides: &BTreeMap<String, Value>,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            // Unterminated: emit the remainder verbatim.
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        let value = is_token_name(name)
            .then(|| overrides.get(name).or_else(|| context.get(name)))
            .flatten();
        match value {
            Some(v) => out.push_str(&format_value(v)),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn is_token_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Display form of a context value.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Number(n) => n.as_f64().map(format_sek).unwrap_or_else(|| n.to_string()),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Format an amount sv-SE style: whole kronor, space-grouped thousands.
pub fn format_sek(amount: f64) -> String {
    let rounded = amount.round();
    // -0.4 rounds to -0; show it as 0.
    let negative = rounded < 0.0;
    let digits = format!("{:.0}", rounded.abs());

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if negative {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    grouped
}

/// Substitute tokens inside an `api_call` parameter object.
///
/// A string that is exactly one `{token}` becomes the raw context value
/// (so numbers stay numbers); other strings are rendered as text.
pub fn substitute_params(params: &Value, context: &BTreeMap<String, Value>) -> Value {
    match params {
        Value::String(s) => {
            let whole = s
                .strip_prefix('{')
                .and_then(|inner| inner.strip_suffix('}'))
                .filter(|inner| is_token_name(inner));
            match whole.and_then(|name| context.get(name)) {
                Some(v) => v.clone(),
                None => Value::String(render(s, context, &BTreeMap::new())),
            }
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| substitute_params(v, context))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_params(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
