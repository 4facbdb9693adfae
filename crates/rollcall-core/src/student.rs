//! Student records.
//!
//! A student is identified by its `student_code`, which is trimmed and
//! upper-cased on the way in and doubles as the store primary key (`_id`).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("static email regex is valid")
});

/// Maximum length of a student code.
pub const MAX_CODE_LEN: usize = 50;

/// Normalize and validate a student code.
///
/// Codes are upper-cased and restricted to `[A-Z0-9._-]` so they can be
/// embedded in cache keys and glob patterns without escaping.
pub fn normalize_student_code(raw: &str) -> Result<String> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() {
        return Err(CoreError::validation(
            "student_code",
            "student_code cannot be empty",
        ));
    }
    if code.chars().count() > MAX_CODE_LEN {
        return Err(CoreError::validation(
            "student_code",
            format!("must be at most {MAX_CODE_LEN} characters"),
        ));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(CoreError::validation(
            "student_code",
            "may only contain letters, digits, '.', '_' and '-'",
        ));
    }
    Ok(code)
}

fn check_len(field: &'static str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min {
        return Err(CoreError::validation(field, "must not be empty"));
    }
    if len > max {
        return Err(CoreError::validation(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(())
}

fn check_optional(field: &'static str, value: &Option<String>, max: usize) -> Result<()> {
    match value {
        Some(v) => check_len(field, v, 0, max),
        None => Ok(()),
    }
}

fn check_email(value: &Option<String>) -> Result<()> {
    match value {
        Some(email) if !EMAIL_RE.is_match(email) => Err(CoreError::validation(
            "email",
            "value is not a valid email address",
        )),
        _ => Ok(()),
    }
}

/// Payload accepted when creating a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentInput {
    pub first_name: String,
    pub last_name: String,
    pub student_code: String,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
}

impl StudentInput {
    /// Validate every field and return the normalized input.
    pub fn validate(mut self) -> Result<Self> {
        self.student_code = normalize_student_code(&self.student_code)?;
        check_len("first_name", &self.first_name, 1, 100)?;
        check_len("last_name", &self.last_name, 1, 100)?;
        check_optional("grade_level", &self.grade_level, 20)?;
        check_optional("phone", &self.phone, 20)?;
        check_optional("class_name", &self.class_name, 50)?;
        check_email(&self.email)?;
        Ok(self)
    }

    /// Build the stored representation; the code is the primary key.
    pub fn into_student(self) -> Student {
        Student {
            id: self.student_code.clone(),
            first_name: self.first_name,
            last_name: self.last_name,
            student_code: self.student_code,
            grade_level: self.grade_level,
            phone: self.phone,
            email: self.email,
            class_name: self.class_name,
        }
    }
}

/// Partial update of a student. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl StudentPatch {
    /// Validate the provided fields against the code in the request path.
    ///
    /// A code in the body must normalize to the path code; codes are
    /// immutable because they are the primary key.
    pub fn validate(mut self, path_code: &str) -> Result<Self> {
        if let Some(ref raw) = self.student_code {
            let code = normalize_student_code(raw)?;
            if code != path_code {
                return Err(CoreError::validation(
                    "student_code",
                    "does not match the student being updated",
                ));
            }
            self.student_code = Some(code);
        }
        if let Some(ref v) = self.first_name {
            check_len("first_name", v, 1, 100)?;
        }
        if let Some(ref v) = self.last_name {
            check_len("last_name", v, 1, 100)?;
        }
        check_optional("grade_level", &self.grade_level, 20)?;
        check_optional("phone", &self.phone, 20)?;
        check_optional("class_name", &self.class_name, 50)?;
        check_email(&self.email)?;
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A stored student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub student_code: String,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
