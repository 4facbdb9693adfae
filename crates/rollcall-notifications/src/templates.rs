//! Message bodies sent by the notifier.

/// Body of the SMS sent when a student is marked absent.
pub fn absence_message(first_name: &str, last_name: &str, date: &str) -> String {
    format!("Student {first_name} {last_name} was absent on {date}.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absence_message() {
        assert_eq!(
            absence_message("Ada", "Lovelace", "2024-01-01"),
            "Student Ada Lovelace was absent on 2024-01-01."
        );
    }
}
