//! Validation state accumulated across rules

use crate::error::{CoreError, CoreResult};
use crate::validation::messages::{custom_message, Locale, ValidationMessage};
use serde_json::Value;
use std::collections::HashMap;

/// Accumulates validation failures and cross-field state
#[derive(Debug, Default)]
pub struct ValidationContext {
    pub locale: Locale,
    errors: Vec<ValidationMessage>,
    data: HashMap<String, Value>,
}

impl ValidationContext {
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            errors: Vec::new(),
            data: HashMap::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationMessage) {
        self.errors.push(error);
    }

    /// Add a custom error for a field
    pub fn add_field_error(&mut self, field: &str, message: &str) {
        let locale = self.locale;
        self.add_error(custom_message(field, message, locale));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationMessage] {
        &self.errors
    }

    /// Errors grouped by field name
    pub fn error_map(&self) -> HashMap<String, Vec<String>> {
        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        for error in &self.errors {
            grouped
                .entry(error.field.clone())
                .or_default()
                .push(error.to_string());
        }
        grouped
    }

    /// {type, field, message, params} entries for API responses
    pub fn error_entries(&self) -> Vec<Value> {
        self.errors.iter().map(|e| e.to_entry()).collect()
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// Store data for cross-field rules
    pub fn set_data(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    pub fn data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Error out if any failures were recorded
    pub fn into_result(self) -> CoreResult<()> {
        if self.has_errors() {
            let summary = self
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            Err(CoreError::Validation(summary))
        } else {
            Ok(())
        }
    }
}
