//! Attendance records, unique per (student, date).

use serde::{Deserialize, Serialize};

use crate::date::normalize_day;
use crate::error::{CoreError, Result};
use crate::student::normalize_student_code;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 3] = [Self::Present, Self::Absent, Self::Late];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
        }
    }
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttendanceStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "late" => Ok(Self::Late),
            other => Err(CoreError::validation(
                "status",
                format!("must be one of present, absent, late (got '{other}')"),
            )),
        }
    }
}

/// Payload accepted when marking attendance.
///
/// `student_id` is accepted as an alias of `student_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceMark {
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub student_code: Option<String>,
    pub date: String,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub recorded_by: Option<String>,
}

/// A validated mark, ready to be upserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidMark {
    pub student_code: String,
    pub date: String,
    pub status: AttendanceStatus,
    pub note: Option<String>,
    pub recorded_by: Option<String>,
}

impl AttendanceMark {
    pub fn validate(self) -> Result<ValidMark> {
        let raw_code = self
            .student_code
            .as_deref()
            .or(self.student_id.as_deref())
            .filter(|c| !c.trim().is_empty())
            .ok_or(CoreError::MissingStudentCode)?;
        let student_code = normalize_student_code(raw_code)?;
        let date = normalize_day(&self.date)?;
        if let Some(ref note) = self.note
            && note.chars().count() > 500
        {
            return Err(CoreError::validation("note", "must be at most 500 characters"));
        }
        if let Some(ref by) = self.recorded_by
            && by.chars().count() > 100
        {
            return Err(CoreError::validation(
                "recorded_by",
                "must be at most 100 characters",
            ));
        }
        Ok(ValidMark {
            student_code,
            date,
            status: self.status,
            note: self.note,
            recorded_by: self.recorded_by,
        })
    }
}

/// A stored attendance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub student_id: String,
    pub student_code: String,
    pub date: String,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub recorded_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(code: Option<&str>, id: Option<&str>) -> AttendanceMark {
        AttendanceMark {
            student_id: id.map(String::from),
            student_code: code.map(String::from),
            date: "2024-01-01".into(),
            status: AttendanceStatus::Absent,
            note: None,
            recorded_by: None,
        }
    }

    #[test]
    fn test_code_preferred_over_id() {
        let valid = mark(Some("s1"), Some("s2")).validate().unwrap();
        assert_eq!(valid.student_code, "S1");
    }

    #[test]
    fn test_id_used_as_fallback() {
        let valid = mark(None, Some("s2")).validate().unwrap();
        assert_eq!(valid.student_code, "S2");
    }

    #[test]
    fn test_missing_code() {
        let err = mark(None, None).validate().unwrap_err();
        assert!(matches!(err, CoreError::MissingStudentCode));
        let err = mark(Some("  "), None).validate().unwrap_err();
        assert!(matches!(err, CoreError::MissingStudentCode));
    }

    #[test]
    fn test_bad_date() {
        let mut m = mark(Some("S1"), None);
        m.date = "01/01/2024".into();
        assert!(matches!(m.validate(), Err(CoreError::InvalidDate(_))));
    }

    #[test]
    fn test_status_wire_format() {
        let parsed: AttendanceMark = serde_json::from_value(serde_json::json!({
            "student_code": "S1",
            "date": "2024-01-01",
            "status": "late"
        }))
        .unwrap();
        assert_eq!(parsed.status, AttendanceStatus::Late);

        let bad = serde_json::from_value::<AttendanceMark>(serde_json::json!({
            "student_code": "S1",
            "date": "2024-01-01",
            "status": "sick"
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("present".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::Present);
        assert!("PRESENT".parse::<AttendanceStatus>().is_err());
    }
}
