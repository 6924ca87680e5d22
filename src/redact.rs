// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Masks personal data before it reaches a log line.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
        .expect("uuid pattern")
});
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern")
});
static IBAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z]{2}\d{2}(?:\s?[A-Z0-9]{4}){2,7}(?:\s?[A-Z0-9]{1,3})?\b").expect("iban pattern")
});
static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:(?:CHF|EUR|USD|GBP|Fr\.|[$€£])\s?)?-?\b\d{1,3}(?:[',]?\d{3})*\.\d{2}\b")
        .expect("amount pattern")
});

const SENSITIVE_FIELDS: &[&str] = &[
    "amount",
    "balance",
    "email",
    "iban",
    "payee",
    "note",
    "name",
    "splitamount",
    "allocatedamount",
    "spentamount",
    "totalincome",
    "totalallocated",
    "totalspent",
];

pub fn redact(input: &str) -> String {
    let out = UUID_RE.replace_all(input, "[id]");
    let out = EMAIL_RE.replace_all(&out, "[email]");
    let out = IBAN_RE.replace_all(&out, "[iban]");
    let out = AMOUNT_RE.replace_all(&out, "[amount]");
    out.into_owned()
}

/// Mask sensitive keys anywhere in a JSON value, then scrub remaining strings.
pub fn redact_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                if SENSITIVE_FIELDS.contains(&k.to_lowercase().as_str()) {
                    *v = Value::String("[redacted]".into());
                } else {
                    redact_fields(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_fields),
        Value::String(s) => *s = redact(s),
        _ => {}
    }
}

/// Display wrapper that redacts whatever it wraps; use as `%Redacted(&x)`.
pub struct Redacted<T>(pub T);

impl<T: fmt::Display> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&redact(&self.0.to_string()))
    }
}
