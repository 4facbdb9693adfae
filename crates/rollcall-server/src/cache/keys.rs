//! Cache key layout.
//!
//! Every cached entity and list lives under a deterministic key derived from
//! its identifiers. Both the read path and the invalidation path build keys
//! here so they can never disagree.

/// Key of the cached full student list.
pub const STUDENTS_LIST: &str = "students:list";

/// Key of the unfiltered attendance list.
pub const ATTENDANCE_LIST_ALL: &str = "attendance:list:all";

pub fn student(code: &str) -> String {
    format!("student:{code}")
}

pub fn attendance(code: &str, date: &str) -> String {
    format!("attendance:{code}:{date}")
}

/// Key for an attendance list query. Absent filters are left out of the key.
pub fn attendance_list(date: Option<&str>, code: Option<&str>) -> String {
    match (date, code) {
        (Some(date), Some(code)) => format!("attendance:list:{date}:{code}"),
        (Some(date), None) => format!("attendance:list:{date}"),
        (None, Some(code)) => format!("attendance:list:student:{code}"),
        (None, None) => ATTENDANCE_LIST_ALL.to_string(),
    }
}

/// Glob matching every per-day attendance record of one student.
pub fn attendance_sweep_pattern(code: &str) -> String {
    format!("attendance:{code}:*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_keys() {
        assert_eq!(student("S1"), "student:S1");
        assert_eq!(attendance("S1", "2024-09-01"), "attendance:S1:2024-09-01");
        assert_eq!(attendance_sweep_pattern("S1"), "attendance:S1:*");
    }

    #[test]
    fn test_list_keys_are_distinct_per_filter_combination() {
        let keys = [
            attendance_list(Some("2024-09-01"), Some("S1")),
            attendance_list(Some("2024-09-01"), None),
            attendance_list(None, Some("S1")),
            attendance_list(None, None),
        ];
        assert_eq!(keys[0], "attendance:list:2024-09-01:S1");
        assert_eq!(keys[1], "attendance:list:2024-09-01");
        assert_eq!(keys[2], "attendance:list:student:S1");
        assert_eq!(keys[3], "attendance:list:all");

        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), 4);
    }
}
