//! Shared types for the School API.
//!
//! These are the shapes exchanged between the data-access context in
//! `school-db` and the HTTP controllers in `school-server`. Field names are
//! serialized in camelCase on the wire.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a person name component.
pub const MAX_NAME_LEN: usize = 100;

/// Maximum number of credits a course may carry.
pub const MAX_COURSE_CREDITS: u8 = 10;

/// Wire format of `Student::enrollment_date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A persisted student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Calendar date in `YYYY-MM-DD` form.
    pub enrollment_date: String,
}

/// Payload for creating a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub enrollment_date: String,
}

/// A persisted course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub credits: u8,
}

/// Payload for creating a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub title: String,
    pub credits: u8,
}

/// A payload failed field validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("email '{0}' is not a valid address")]
    InvalidEmail(String),

    #[error("enrollmentDate '{0}' is not a YYYY-MM-DD date")]
    InvalidDate(String),

    #[error("credits must be between 0 and {max}, got {got}")]
    CreditsOutOfRange { got: u8, max: u8 },
}

fn require_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

impl NewStudent {
    /// Checks every field, returning the first violation found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("firstName", &self.first_name, MAX_NAME_LEN)?;
        require_text("lastName", &self.last_name, MAX_NAME_LEN)?;

        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(ValidationError::InvalidEmail(self.email.clone())),
        }

        NaiveDate::parse_from_str(self.enrollment_date.trim(), DATE_FORMAT)
            .map_err(|_| ValidationError::InvalidDate(self.enrollment_date.clone()))?;

        Ok(())
    }
}

impl NewCourse {
    /// Checks every field, returning the first violation found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title, MAX_NAME_LEN)?;
        if self.credits > MAX_COURSE_CREDITS {
            return Err(ValidationError::CreditsOutOfRange {
                got: self.credits,
                max: MAX_COURSE_CREDITS,
            });
        }
        Ok(())
    }
}
