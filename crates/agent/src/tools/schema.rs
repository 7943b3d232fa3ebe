//! Tool argument schemas and the `key=value` input decoder.

use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use super::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Text,
    Number,
    Flag,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamKind::Text => "text",
            ParamKind::Number => "number",
            ParamKind::Flag => "flag",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(s) => f.write_str(s),
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Flag(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Fallback {
    Value(ParamValue),
    /// Absent unless given
    Optional,
    /// Must be given
    Required,
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    fallback: Fallback,
}

impl ParamSpec {
    pub fn text(name: &'static str, default: &str) -> Self {
        Self {
            name,
            kind: ParamKind::Text,
            fallback: Fallback::Value(ParamValue::Text(default.to_string())),
        }
    }

    pub fn number(name: &'static str, default: f64) -> Self {
        Self {
            name,
            kind: ParamKind::Number,
            fallback: Fallback::Value(ParamValue::Number(default)),
        }
    }

    pub fn flag(name: &'static str, default: bool) -> Self {
        Self {
            name,
            kind: ParamKind::Flag,
            fallback: Fallback::Value(ParamValue::Flag(default)),
        }
    }

    pub fn optional_number(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Number,
            fallback: Fallback::Optional,
        }
    }

    pub fn required_text(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Text,
            fallback: Fallback::Required,
        }
    }

    pub fn default_value(&self) -> Option<&ParamValue> {
        match &self.fallback {
            Fallback::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_required(&self) -> bool {
        self.fallback == Fallback::Required
    }

    /// `name: kind = default` as shown to the model
    pub fn signature(&self) -> String {
        match &self.fallback {
            Fallback::Value(ParamValue::Text(s)) => format!("{}: {} = '{}'", self.name, self.kind, s),
            Fallback::Value(v) => format!("{}: {} = {}", self.name, self.kind, v),
            Fallback::Optional => format!("{}: {} = none", self.name, self.kind),
            Fallback::Required => format!("{}: {}", self.name, self.kind),
        }
    }
}

/// Ordered parameter declarations of one tool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolSchema {
    params: Vec<ParamSpec>,
}

impl ToolSchema {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// `(a: text = 'x', b: number = 1)`
    pub fn signature(&self) -> String {
        let parts: Vec<String> = self.params.iter().map(ParamSpec::signature).collect();
        format!("({})", parts.join(", "))
    }

    /// Map a raw input string onto this schema.
    ///
    /// Unknown keys and values of the wrong kind are dropped in favour of the
    /// default. Only a missing required parameter is an error.
    pub fn decode(&self, input: &str) -> Result<ToolArgs, ToolError> {
        let raw = parse_params(input);
        let mut values = HashMap::new();

        for (key, value) in &raw {
            if self.get(key).is_none() {
                debug!("◆ IGNORING UNKNOWN ARGUMENT {}={}", key, value.text);
            }
        }

        for spec in &self.params {
            let given = raw.iter().rev().find(|(k, _)| k == spec.name).map(|(_, v)| v);
            let coerced = given.and_then(|v| {
                let value = v.coerce(spec.kind);
                if value.is_none() {
                    debug!(
                        "◆ ARGUMENT {}={:?} IS NOT A {}, USING DEFAULT",
                        spec.name, v.text, spec.kind
                    );
                }
                value
            });

            match (coerced, &spec.fallback) {
                (Some(value), _) => {
                    values.insert(spec.name.to_string(), value);
                }
                (None, Fallback::Value(default)) => {
                    values.insert(spec.name.to_string(), default.clone());
                }
                (None, Fallback::Optional) => {}
                (None, Fallback::Required) => {
                    return Err(ToolError::MissingArgument(spec.name.to_string()));
                }
            }
        }

        Ok(ToolArgs { values })
    }
}

/// One `key=value` pair before it meets a schema
#[derive(Debug, Clone, PartialEq)]
pub struct RawValue {
    pub text: String,
    pub number: Option<f64>,
}

impl RawValue {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            number: text.trim().parse::<f64>().ok(),
        }
    }

    fn coerce(&self, kind: ParamKind) -> Option<ParamValue> {
        match kind {
            ParamKind::Text => Some(ParamValue::Text(self.text.clone())),
            ParamKind::Number => self.number.map(ParamValue::Number),
            ParamKind::Flag => parse_flag(&self.text).map(ParamValue::Flag),
        }
    }
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Split `a=1, b='x'` into ordered pairs.
///
/// Pairs are separated by `", "`, split on the first `=`, and lose surrounding
/// `'`/`"` quotes. Pairs without `=` and pairs with an empty value are
/// skipped. Numeric-looking values carry their parsed number.
pub fn parse_params(input: &str) -> Vec<(String, RawValue)> {
    if input.is_empty() {
        return Vec::new();
    }

    let mut pairs = Vec::new();
    for part in input.split(", ") {
        let Some((key, value)) = part.split_once('=') else {
            debug!("◆ SKIPPING MALFORMED ARGUMENT {:?}", part);
            continue;
        };
        let value = value.trim_matches('\'').trim_matches('"');
        if value.trim().is_empty() {
            continue;
        }
        pairs.push((key.trim().to_string(), RawValue::new(value.trim())));
    }
    pairs
}

/// Decoded arguments, one value per declared parameter that has one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: HashMap<String, ParamValue>,
}

impl ToolArgs {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn text(&self, name: &str) -> Result<&str, ToolError> {
        match self.values.get(name) {
            Some(ParamValue::Text(s)) => Ok(s),
            _ => Err(ToolError::MissingArgument(name.to_string())),
        }
    }

    pub fn number(&self, name: &str) -> Result<f64, ToolError> {
        self.optional_number(name)
            .ok_or_else(|| ToolError::MissingArgument(name.to_string()))
    }

    pub fn optional_number(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(ParamValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Result<bool, ToolError> {
        match self.values.get(name) {
            Some(ParamValue::Flag(b)) => Ok(*b),
            _ => Err(ToolError::MissingArgument(name.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
