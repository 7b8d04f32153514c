//! Reusable validation rules
//!
//! Each rule records failures on the context and reports whether the field
//! passed. `None`/null values pass every rule except `required`, so presence
//! checks stay composable with shape checks.

use crate::validation::context::ValidationContext;
use crate::validation::messages::{
    invalid_enum, invalid_type, out_of_range, required_field, MessageKind, ValidationMessage,
};
use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

/// A validation rule over a named field
pub type Rule = Box<dyn Fn(&str, &Value, &mut ValidationContext) -> bool + Send + Sync>;

/// Field must be present and non-empty
pub fn required(field: &str, value: &Value, ctx: &mut ValidationContext) -> bool {
    let missing = match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    if missing {
        let locale = ctx.locale;
        ctx.add_error(required_field(field, locale));
        return false;
    }
    true
}

/// String length bounds
pub fn string_length(min_length: Option<usize>, max_length: Option<usize>) -> Rule {
    Box::new(move |field, value, ctx| {
        let text = match value {
            Value::Null => return true,
            Value::String(s) => s,
            _ => {
                let locale = ctx.locale;
                ctx.add_error(invalid_type(field, "string", locale));
                return false;
            }
        };
        let mut valid = true;
        if let Some(min) = min_length {
            if text.chars().count() < min {
                let locale = ctx.locale;
                ctx.add_error(
                    ValidationMessage::new(MessageKind::TooShort, field, locale)
                        .with_param("min_length", min),
                );
                valid = false;
            }
        }
        if let Some(max) = max_length {
            if text.chars().count() > max {
                let locale = ctx.locale;
                ctx.add_error(
                    ValidationMessage::new(MessageKind::TooLong, field, locale)
                        .with_param("max_length", max),
                );
                valid = false;
            }
        }
        valid
    })
}

/// Numeric bounds (inclusive)
pub fn numeric_range(min_value: Option<f64>, max_value: Option<f64>) -> Rule {
    Box::new(move |field, value, ctx| {
        let number = match value {
            Value::Null => return true,
            Value::Number(n) => match n.as_f64() {
                Some(f) => f,
                None => {
                    let locale = ctx.locale;
                    ctx.add_error(invalid_type(field, "number", locale));
                    return false;
                }
            },
            _ => {
                let locale = ctx.locale;
                ctx.add_error(invalid_type(field, "number", locale));
                return false;
            }
        };
        let below = min_value.map_or(false, |min| number < min);
        let above = max_value.map_or(false, |max| number > max);
        if below || above {
            let locale = ctx.locale;
            ctx.add_error(out_of_range(
                field,
                min_value.unwrap_or(f64::NEG_INFINITY),
                max_value.unwrap_or(f64::INFINITY),
                locale,
            ));
            return false;
        }
        true
    })
}

/// Value must be one of the allowed strings
pub fn enum_values(allowed: Vec<&'static str>) -> Rule {
    Box::new(move |field, value, ctx| {
        let text = match value {
            Value::Null => return true,
            Value::String(s) => s.as_str(),
            _ => {
                let locale = ctx.locale;
                ctx.add_error(invalid_type(field, "string", locale));
                return false;
            }
        };
        if !allowed.contains(&text) {
            let locale = ctx.locale;
            ctx.add_error(invalid_enum(field, &allowed, locale));
            return false;
        }
        true
    })
}

/// Value must match the pattern
pub fn regex_pattern(pattern: &str, error_message: Option<&'static str>) -> Rule {
    // Patterns are crate-defined; a bad one is a programming error surfaced
    // at rule construction.
    let compiled = Regex::new(pattern).unwrap_or_else(|e| {
        panic!("invalid validation pattern {:?}: {}", pattern, e);
    });
    Box::new(move |field, value, ctx| {
        let text = match value {
            Value::Null => return true,
            Value::String(s) => s.as_str(),
            _ => {
                let locale = ctx.locale;
                ctx.add_error(invalid_type(field, "string", locale));
                return false;
            }
        };
        if !compiled.is_match(text) {
            match error_message {
                Some(message) => ctx.add_field_error(field, message),
                None => {
                    let locale = ctx.locale;
                    ctx.add_error(ValidationMessage::new(
                        MessageKind::PatternMismatch,
                        field,
                        locale,
                    ));
                }
            }
            return false;
        }
        true
    })
}

/// Basic email shape
pub fn email_format() -> Rule {
    regex_pattern(
        r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$",
        Some("Invalid email format"),
    )
}

/// Parseable UUID
pub fn uuid_format() -> Rule {
    Box::new(|field, value, ctx| {
        let text = match value {
            Value::Null => return true,
            Value::String(s) => s.as_str(),
            _ => {
                ctx.add_field_error(field, "Invalid UUID format");
                return false;
            }
        };
        if Uuid::parse_str(text).is_err() {
            ctx.add_field_error(field, "Invalid UUID format");
            return false;
        }
        true
    })
}

/// ISO date within bounds (inclusive)
pub fn date_range(min_date: Option<NaiveDate>, max_date: Option<NaiveDate>) -> Rule {
    Box::new(move |field, value, ctx| {
        let parsed = match value {
            Value::Null => return true,
            Value::String(s) => match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                Ok(date) => date,
                Err(_) => {
                    ctx.add_field_error(field, "Invalid date format");
                    return false;
                }
            },
            _ => {
                let locale = ctx.locale;
                ctx.add_error(invalid_type(field, "date", locale));
                return false;
            }
        };
        if min_date.map_or(false, |min| parsed < min) || max_date.map_or(false, |max| parsed > max)
        {
            let locale = ctx.locale;
            ctx.add_error(out_of_range(
                field,
                min_date.map(|d| d.to_string()).unwrap_or_else(|| "past".into()),
                max_date.map(|d| d.to_string()).unwrap_or_else(|| "present".into()),
                locale,
            ));
            return false;
        }
        true
    })
}

/// All rules must pass
pub fn all_of(rules: Vec<Rule>) -> Rule {
    Box::new(move |field, value, ctx| {
        let mut valid = true;
        for rule in &rules {
            if !rule(field, value, ctx) {
                valid = false;
            }
        }
        valid
    })
}

/// At least one rule must pass; failures from probing are discarded
pub fn any_of(rules: Vec<Rule>) -> Rule {
    Box::new(move |field, value, ctx| {
        for rule in &rules {
            let mut probe = ValidationContext::new(ctx.locale);
            if rule(field, value, &mut probe) {
                return true;
            }
        }
        ctx.add_field_error(field, "Value does not meet any of the requirements");
        false
    })
}

/// PGY level must be an integer 1-3
pub fn pgy_level_rule() -> Rule {
    Box::new(|field, value, ctx| {
        let passes_range = numeric_range(Some(1.0), Some(3.0))(field, value, ctx);
        match value {
            Value::Null => passes_range,
            Value::Number(n) if n.is_u64() || n.is_i64() => passes_range,
            Value::Number(_) => {
                ctx.add_field_error(field, "PGY level must be an integer");
                false
            }
            _ => passes_range,
        }
    })
}

/// Person type must be resident or faculty
pub fn person_type_rule() -> Rule {
    enum_values(vec!["resident", "faculty"])
}

/// Faculty role must be a known tag
pub fn faculty_role_rule() -> Rule {
    enum_values(vec!["pd", "apd", "oic", "dept_chief", "sports_med", "core"])
}

/// Percentage in [0, 100]
pub fn percentage_rule() -> Rule {
    numeric_range(Some(0.0), Some(100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::messages::Locale;
    use serde_json::json;

    fn ctx() -> ValidationContext {
        ValidationContext::new(Locale::EnUs)
    }

    #[test]
    fn test_required() {
        let mut context = ctx();
        assert!(!required("name", &Value::Null, &mut context));
        assert!(!required("name", &json!("  "), &mut context));
        assert!(required("name", &json!("Dr. Smith"), &mut context));
        assert_eq!(context.errors().len(), 2);
    }

    #[test]
    fn test_string_length_bounds() {
        let rule = string_length(Some(2), Some(5));
        let mut context = ctx();
        assert!(rule("abbr", &json!("abc"), &mut context));
        assert!(!rule("abbr", &json!("a"), &mut context));
        assert!(!rule("abbr", &json!("abcdef"), &mut context));
        // Null passes; presence is required()'s job
        assert!(rule("abbr", &Value::Null, &mut context));
    }

    #[test]
    fn test_numeric_range() {
        let rule = numeric_range(Some(1.0), Some(3.0));
        let mut context = ctx();
        assert!(rule("pgy_level", &json!(2), &mut context));
        assert!(!rule("pgy_level", &json!(4), &mut context));
        assert!(!rule("pgy_level", &json!("2"), &mut context));
    }

    #[test]
    fn test_enum_values() {
        let rule = person_type_rule();
        let mut context = ctx();
        assert!(rule("person_type", &json!("resident"), &mut context));
        assert!(!rule("person_type", &json!("intern"), &mut context));
    }

    #[test]
    fn test_email_and_uuid() {
        let email = email_format();
        let uuid = uuid_format();
        let mut context = ctx();
        assert!(email("email", &json!("a@b.org"), &mut context));
        assert!(!email("email", &json!("not-an-email"), &mut context));
        assert!(uuid("id", &json!("550e8400-e29b-41d4-a716-446655440000"), &mut context));
        assert!(!uuid("id", &json!("nope"), &mut context));
    }

    #[test]
    fn test_date_range() {
        let rule = date_range(
            NaiveDate::from_ymd_opt(2025, 1, 1),
            NaiveDate::from_ymd_opt(2025, 12, 31),
        );
        let mut context = ctx();
        assert!(rule("start_date", &json!("2025-06-01"), &mut context));
        assert!(!rule("start_date", &json!("2024-12-31"), &mut context));
        assert!(!rule("start_date", &json!("June 1"), &mut context));
    }

    #[test]
    fn test_combinators() {
        let rule = any_of(vec![email_format(), uuid_format()]);
        let mut context = ctx();
        assert!(rule("contact", &json!("a@b.org"), &mut context));
        assert!(!rule("contact", &json!("neither"), &mut context));
        assert_eq!(context.errors().len(), 1);
    }
}
