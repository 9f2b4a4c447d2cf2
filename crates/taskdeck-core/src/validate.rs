//! Field-level validation for task create/edit input. Runs before any
//! network call; a failure here never reaches the API client.

use std::fmt;

use chrono::{DateTime, Utc};

pub const TITLE_MIN: usize = 3;
pub const TITLE_MAX: usize = 100;
pub const DESCRIPTION_MAX: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for FieldError {}

pub fn validate_title(title: &str) -> Result<(), FieldError> {
    let trimmed = title.trim();
    let len = trimmed.chars().count();
    if len < TITLE_MIN {
        return Err(FieldError::new(
            "title",
            format!("must be at least {TITLE_MIN} characters"),
        ));
    }
    if len > TITLE_MAX {
        return Err(FieldError::new(
            "title",
            format!("must be at most {TITLE_MAX} characters"),
        ));
    }
    Ok(())
}

pub fn validate_description(description: Option<&str>) -> Result<(), FieldError> {
    let Some(description) = description else {
        return Ok(());
    };
    if description.chars().count() > DESCRIPTION_MAX {
        return Err(FieldError::new(
            "description",
            format!("must be at most {DESCRIPTION_MAX} characters"),
        ));
    }
    Ok(())
}

/// Only enforced when a deadline is supplied: new deadlines cannot
/// already be in the past.
pub fn validate_deadline(
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), FieldError> {
    let Some(deadline) = deadline else {
        return Ok(());
    };
    if deadline < now {
        return Err(FieldError::new("deadline", "cannot be in the past"));
    }
    Ok(())
}

/// Collects every field failure so the caller can report them together.
pub fn validate_task_fields(
    title: Option<&str>,
    description: Option<&str>,
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if let Some(title) = title
        && let Err(err) = validate_title(title)
    {
        errors.push(err);
    }
    if let Err(err) = validate_description(description) {
        errors.push(err);
    }
    if let Err(err) = validate_deadline(deadline, now) {
        errors.push(err);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{
        validate_deadline, validate_description, validate_task_fields, validate_title,
    };

    #[test]
    fn title_length_boundaries() {
        assert!(validate_title("ab").is_err());
        assert!(validate_title("abc").is_ok());
        assert!(validate_title(&"x".repeat(100)).is_ok());
        assert!(validate_title(&"x".repeat(101)).is_err());
        // Surrounding whitespace does not count toward the minimum.
        assert!(validate_title("  a  ").is_err());
    }

    #[test]
    fn description_is_optional_but_bounded() {
        assert!(validate_description(None).is_ok());
        assert!(validate_description(Some("")).is_ok());
        assert!(validate_description(Some(&"d".repeat(500))).is_ok());
        assert!(validate_description(Some(&"d".repeat(501))).is_err());
    }

    #[test]
    fn past_deadlines_are_rejected() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().expect("valid now");
        assert!(validate_deadline(None, now).is_ok());
        assert!(validate_deadline(Some(now + Duration::hours(1)), now).is_ok());
        assert!(validate_deadline(Some(now - Duration::hours(1)), now).is_err());
    }

    #[test]
    fn all_failures_are_collected() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().expect("valid now");
        let errors = validate_task_fields(
            Some("xy"),
            Some(&"d".repeat(501)),
            Some(now - Duration::days(1)),
            now,
        )
        .expect_err("all three fields invalid");
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["title", "description", "deadline"]);
    }
}
