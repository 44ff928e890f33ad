//! Push payload parsing and alias resolution.
//!
//! The remote messaging service abbreviates field names, so each logical
//! field is read from an ordered list of keys. The first key holding a
//! truthy value wins; when none does, the field's default applies.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Default title when no alias resolves.
pub const DEFAULT_TITLE: &str = "Notification";

/// Logical fields of a push payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadField {
    Title,
    Body,
    ImageUrl,
    TargetUrl,
    CampaignId,
}

impl PayloadField {
    /// Keys checked for this field, in priority order.
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Title => &["t", "title"],
            Self::Body => &["a", "alert", "body"],
            Self::ImageUrl => &["img", "image", "i"],
            Self::TargetUrl => &["u", "url"],
            Self::CampaignId => &["cid"],
        }
    }

    /// Value used when no alias resolves. `None` means the field is absent.
    pub const fn default_value(self) -> Option<&'static str> {
        match self {
            Self::Title => Some(DEFAULT_TITLE),
            Self::Body => Some(""),
            Self::ImageUrl | Self::TargetUrl | Self::CampaignId => None,
        }
    }
}

impl fmt::Display for PayloadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Title => "title",
            Self::Body => "body",
            Self::ImageUrl => "image_url",
            Self::TargetUrl => "target_url",
            Self::CampaignId => "campaign_id",
        };
        f.write_str(name)
    }
}

/// A parsed push body: always a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct PushPayload {
    fields: Map<String, Value>,
}

impl PushPayload {
    /// Parse a raw push body.
    ///
    /// Empty bodies, invalid UTF-8, invalid JSON, `null` and any JSON value
    /// other than an object are all [`Error::Parse`].
    pub fn parse(raw: Option<&[u8]>) -> Result<Self> {
        let bytes = raw.filter(|b| !b.is_empty()).ok_or_else(|| Error::parse("empty body"))?;
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::parse(format!("body is not UTF-8: {e}")))?;

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(fields)) => Ok(Self { fields }),
            Ok(Value::Null) => Err(Error::parse("payload is null")),
            Ok(other) => Err(Error::parse(format!(
                "payload is a JSON {}, not an object",
                json_kind(&other)
            ))),
            Err(e) => Err(Error::parse(format!("body is not JSON: {e}"))),
        }
    }

    /// Resolve a field through its aliases, without applying the default.
    pub fn lookup(&self, field: PayloadField) -> Option<String> {
        field
            .aliases()
            .iter()
            .filter_map(|key| self.fields.get(*key))
            .find_map(truthy_string)
    }

    /// Resolve a field, falling back to its default.
    pub fn resolve(&self, field: PayloadField) -> Option<String> {
        self.lookup(field)
            .or_else(|| field.default_value().map(str::to_string))
    }

    /// The payload as a JSON value, for the notification data bag.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// String form of a value that is truthy in the sender's encoding.
///
/// `null`, `false`, `0`, `NaN` and `""` are falsy and skipped so the next
/// alias gets a chance.
fn truthy_string(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some("true".to_string()),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            let zero = n.as_f64().is_none_or(|f| f == 0.0 || f.is_nan());
            (!zero).then(|| n.to_string())
        }
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
