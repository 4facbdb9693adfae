pub mod attendance;
pub mod date;
pub mod error;
pub mod student;

pub use attendance::{AttendanceMark, AttendanceRecord, AttendanceStatus, ValidMark};
pub use date::{format_day, normalize_day, parse_day, today};
pub use error::{CoreError, Result};
pub use student::{Student, StudentInput, StudentPatch, normalize_student_code};
