//! Field validators.
//!
//! [`Validators`] owns the compiled regex cache for every registered field
//! and applies each [`FieldKind`]'s rule to an already-coerced value. One
//! instance lives inside each [`Registry`](crate::model::Registry).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;

use crate::error::{FieldValidationError, ValidationErrorKind};
use crate::field::{FieldInfo, FieldKind};
use crate::value::{Value, civil_from_days, date_to_micros, days_from_civil, format_date};

/// Accepted distance of dates and timestamps from today, in years.
const DATE_WINDOW_YEARS: i32 = 80;

/// Compiled validation state for a registry.
#[derive(Debug, Clone)]
pub struct Validators {
    patterns: HashMap<&'static str, Regex>,
    today: i32,
}

impl Validators {
    /// Create an empty validator set anchored at the current date.
    pub fn new() -> Self {
        let days = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| (d.as_secs() / 86_400) as i32)
            .unwrap_or(0);
        Self::anchored_at(days)
    }

    /// Create a validator set whose date window is centered on `today`
    /// (days since epoch).
    pub fn anchored_at(today: i32) -> Self {
        Self {
            patterns: HashMap::new(),
            today,
        }
    }

    /// Compile the field's pattern, if any, into the cache.
    pub fn register(&mut self, field: &FieldInfo) -> Result<(), regex::Error> {
        if let FieldKind::Text {
            pattern: Some(pattern),
            ..
        } = field.kind
        {
            if !self.patterns.contains_key(pattern) {
                let regex = Regex::new(pattern)?;
                self.patterns.insert(pattern, regex);
            }
        }
        Ok(())
    }

    /// Earliest and latest accepted date (days since epoch).
    pub fn date_window(&self) -> (i32, i32) {
        let (year, month, day) = civil_from_days(self.today);
        // Feb 29 anchors shift to Feb 28 in non-leap years
        let shifted = |y: i32| {
            let d = if month == 2 && day == 29 { 28 } else { day };
            days_from_civil(y, month, d)
        };
        (
            shifted(year - DATE_WINDOW_YEARS),
            shifted(year + DATE_WINDOW_YEARS),
        )
    }

    /// Validate a coerced value against the field's rule.
    ///
    /// NULL is accepted for optional fields and rejected for required ones.
    pub fn check(&self, field: &FieldInfo, value: &Value) -> Result<(), FieldValidationError> {
        let fail = |kind: ValidationErrorKind, message: String| {
            Err(FieldValidationError {
                field: field.name.to_string(),
                kind,
                message,
            })
        };

        if value.is_null() {
            if field.required {
                return fail(ValidationErrorKind::Null, "Value cannot be null".to_string());
            }
            return Ok(());
        }

        match (&field.kind, value) {
            (FieldKind::Id { length, pool }, Value::Text(s)) => {
                if s.chars().count() != *length {
                    return fail(
                        ValidationErrorKind::Length,
                        format!("Value length is not {length}"),
                    );
                }
                if let Some(c) = s.chars().find(|c| !pool.contains(*c)) {
                    return fail(
                        ValidationErrorKind::Pattern,
                        format!("Value contains invalid character '{c}'"),
                    );
                }
                Ok(())
            }
            (FieldKind::Text { min, max, pattern }, Value::Text(s)) => {
                check_length(s, *min, *max).or_else(|(kind, msg)| fail(kind, msg))?;
                if let Some(pattern) = pattern {
                    if !self.matches(pattern, s) {
                        return fail(
                            ValidationErrorKind::Pattern,
                            format!("Value does not match pattern {pattern}"),
                        );
                    }
                }
                Ok(())
            }
            (FieldKind::Email { min, max }, Value::Text(s)) => {
                check_length(s, *min, *max).or_else(|(kind, msg)| fail(kind, msg))?;
                if !is_email(s) {
                    return fail(
                        ValidationErrorKind::Format,
                        "Value is not a valid email address".to_string(),
                    );
                }
                Ok(())
            }
            (FieldKind::Integer { min, max }, v) => match v.as_i64() {
                Some(n) if n < *min => fail(ValidationErrorKind::Min, format!("Value is less than {min}")),
                Some(n) if n > *max => {
                    fail(ValidationErrorKind::Max, format!("Value is greater than {max}"))
                }
                Some(_) => Ok(()),
                None => fail(ValidationErrorKind::Type, "Value is not an integer".to_string()),
            },
            (FieldKind::Boolean, Value::Bool(_)) => Ok(()),
            (
                FieldKind::Enum {
                    type_name,
                    variants,
                },
                Value::Text(s),
            ) => {
                if variants.contains(&s.as_str()) {
                    Ok(())
                } else {
                    fail(
                        ValidationErrorKind::Enum,
                        format!("Value '{s}' is not a valid {type_name}"),
                    )
                }
            }
            (FieldKind::Date, Value::Date(d)) => {
                let (min, max) = self.date_window();
                check_window(i64::from(*d), (i64::from(min), i64::from(max)), (min, max))
                    .or_else(|(kind, msg)| fail(kind, msg))
            }
            (FieldKind::Timestamp, Value::Timestamp(t)) => {
                let (min, max) = self.date_window();
                let bounds = (date_to_micros(min), date_to_micros(max + 1) - 1);
                check_window(*t, bounds, (min, max)).or_else(|(kind, msg)| fail(kind, msg))
            }
            (kind, _) => fail(ValidationErrorKind::Type, kind.mismatch_message()),
        }
    }

    fn matches(&self, pattern: &str, text: &str) -> bool {
        match self.patterns.get(pattern) {
            Some(regex) => regex.is_match(text),
            None => {
                tracing::warn!(pattern, "pattern not registered, compiling on demand");
                Regex::new(pattern).is_ok_and(|r| r.is_match(text))
            }
        }
    }
}

impl Default for Validators {
    fn default() -> Self {
        Self::new()
    }
}

fn check_length(s: &str, min: usize, max: usize) -> Result<(), (ValidationErrorKind, String)> {
    let len = s.chars().count();
    if min == max && len != min {
        return Err((ValidationErrorKind::Length, format!("Value length is not {min}")));
    }
    if len < min {
        return Err((ValidationErrorKind::MinLength, format!("Value is shorter than {min}")));
    }
    if len > max {
        return Err((ValidationErrorKind::MaxLength, format!("Value is longer than {max}")));
    }
    Ok(())
}

/// `value` and `bounds` share a unit; `days` holds the same bounds as dates
/// for the message.
fn check_window(
    value: i64,
    bounds: (i64, i64),
    days: (i32, i32),
) -> Result<(), (ValidationErrorKind, String)> {
    if value < bounds.0 {
        Err((
            ValidationErrorKind::Min,
            format!("Value is before {}", format_date(days.0)),
        ))
    } else if value > bounds.1 {
        Err((
            ValidationErrorKind::Max,
            format!("Value is after {}", format_date(days.1)),
        ))
    } else {
        Ok(())
    }
}

fn is_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|part| !part.is_empty())
}
