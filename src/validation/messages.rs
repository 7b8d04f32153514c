//! Localized validation error messages

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Supported locales for error messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "en_US")]
    EnUs,
    #[serde(rename = "es_ES")]
    EsEs,
    #[serde(rename = "fr_FR")]
    FrFr,
}

/// Kinds of validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Required,
    InvalidType,
    InvalidFormat,
    OutOfRange,
    TooShort,
    TooLong,
    InvalidEnum,
    PatternMismatch,
    Custom,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Required => "required",
            MessageKind::InvalidType => "invalid_type",
            MessageKind::InvalidFormat => "invalid_format",
            MessageKind::OutOfRange => "out_of_range",
            MessageKind::TooShort => "too_short",
            MessageKind::TooLong => "too_long",
            MessageKind::InvalidEnum => "invalid_enum",
            MessageKind::PatternMismatch => "pattern_mismatch",
            MessageKind::Custom => "custom",
        }
    }
}

fn template(kind: MessageKind, locale: Locale) -> &'static str {
    match locale {
        Locale::EnUs => match kind {
            MessageKind::Required => "{field} is required",
            MessageKind::InvalidType => "{field} must be of type {expected_type}",
            MessageKind::InvalidFormat => "{field} has invalid format",
            MessageKind::OutOfRange => "{field} must be between {min_value} and {max_value}",
            MessageKind::TooShort => "{field} must be at least {min_length} characters",
            MessageKind::TooLong => "{field} must not exceed {max_length} characters",
            MessageKind::InvalidEnum => "{field} must be one of: {allowed_values}",
            MessageKind::PatternMismatch => "{field} does not match required pattern",
            MessageKind::Custom => "{message}",
        },
        Locale::EsEs => match kind {
            MessageKind::Required => "{field} es requerido",
            MessageKind::InvalidType => "{field} debe ser de tipo {expected_type}",
            MessageKind::InvalidFormat => "{field} tiene formato inválido",
            MessageKind::OutOfRange => "{field} debe estar entre {min_value} y {max_value}",
            MessageKind::TooShort => "{field} debe tener al menos {min_length} caracteres",
            MessageKind::TooLong => "{field} no debe exceder {max_length} caracteres",
            MessageKind::InvalidEnum => "{field} debe ser uno de: {allowed_values}",
            MessageKind::PatternMismatch => "{field} no coincide con el patrón requerido",
            MessageKind::Custom => "{message}",
        },
        Locale::FrFr => match kind {
            MessageKind::Required => "{field} est requis",
            MessageKind::InvalidType => "{field} doit être de type {expected_type}",
            MessageKind::InvalidFormat => "{field} a un format invalide",
            MessageKind::OutOfRange => "{field} doit être entre {min_value} et {max_value}",
            MessageKind::TooShort => "{field} doit contenir au moins {min_length} caractères",
            MessageKind::TooLong => "{field} ne doit pas dépasser {max_length} caractères",
            MessageKind::InvalidEnum => "{field} doit être l'un de: {allowed_values}",
            MessageKind::PatternMismatch => "{field} ne correspond pas au modèle requis",
            MessageKind::Custom => "{message}",
        },
    }
}

/// Format a snake_case field for display, with domain special cases
pub fn format_field_name(field: &str) -> String {
    match field.to_lowercase().as_str() {
        "pgy_level" => return "PGY Level".to_string(),
        "acgme" => return "ACGME".to_string(),
        "id" => return "ID".to_string(),
        "uuid" => return "UUID".to_string(),
        "url" => return "URL".to_string(),
        "api" => return "API".to_string(),
        _ => {}
    }
    field
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A single validation failure with formatting context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub kind: MessageKind,
    pub field: String,
    pub locale: Locale,
    /// Template parameters (min_value, allowed_values, message, ...)
    pub params: BTreeMap<String, Value>,
}

impl ValidationMessage {
    pub fn new(kind: MessageKind, field: impl Into<String>, locale: Locale) -> Self {
        Self {
            kind,
            field: field.into(),
            locale,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// {type, field, message, params} entry for 422 responses
    pub fn to_entry(&self) -> Value {
        serde_json::json!({
            "type": self.kind.as_str(),
            "field": self.field,
            "message": self.to_string(),
            "params": self.params,
        })
    }
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rendered = template(self.kind, self.locale).to_string();
        rendered = rendered.replace("{field}", &format_field_name(&self.field));
        for (key, value) in &self.params {
            let needle = format!("{{{}}}", key);
            let shown = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&needle, &shown);
        }
        write!(f, "{}", rendered)
    }
}

/// Create a 'required field' message
pub fn required_field(field: &str, locale: Locale) -> ValidationMessage {
    ValidationMessage::new(MessageKind::Required, field, locale)
}

/// Create an 'invalid type' message
pub fn invalid_type(field: &str, expected_type: &str, locale: Locale) -> ValidationMessage {
    ValidationMessage::new(MessageKind::InvalidType, field, locale)
        .with_param("expected_type", expected_type)
}

/// Create an 'out of range' message
pub fn out_of_range(
    field: &str,
    min_value: impl Into<Value>,
    max_value: impl Into<Value>,
    locale: Locale,
) -> ValidationMessage {
    ValidationMessage::new(MessageKind::OutOfRange, field, locale)
        .with_param("min_value", min_value)
        .with_param("max_value", max_value)
}

/// Create an 'invalid enum value' message
pub fn invalid_enum(field: &str, allowed: &[&str], locale: Locale) -> ValidationMessage {
    ValidationMessage::new(MessageKind::InvalidEnum, field, locale)
        .with_param("allowed_values", allowed.join(", "))
}

/// Create a custom message
pub fn custom_message(field: &str, message: &str, locale: Locale) -> ValidationMessage {
    ValidationMessage::new(MessageKind::Custom, field, locale).with_param("message", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_name_formatting() {
        assert_eq!(format_field_name("first_name"), "First Name");
        assert_eq!(format_field_name("pgy_level"), "PGY Level");
    }

    #[test]
    fn test_localized_rendering() {
        let en = required_field("person_name", Locale::EnUs);
        assert_eq!(en.to_string(), "Person Name is required");
        let es = required_field("person_name", Locale::EsEs);
        assert_eq!(es.to_string(), "Person Name es requerido");
        let fr = required_field("person_name", Locale::FrFr);
        assert_eq!(fr.to_string(), "Person Name est requis");
    }

    #[test]
    fn test_range_params() {
        let msg = out_of_range("pgy_level", 1, 3, Locale::EnUs);
        assert_eq!(msg.to_string(), "PGY Level must be between 1 and 3");
        let entry = msg.to_entry();
        assert_eq!(entry["type"], "out_of_range");
        assert_eq!(entry["params"]["min_value"], 1);
    }
}
