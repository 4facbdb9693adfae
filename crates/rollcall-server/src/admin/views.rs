//! Server-rendered admin pages.

use rollcall_core::{AttendanceRecord, AttendanceStatus, Student};
use serde::Serialize;

const STYLES: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; background: #f5f6f8; color: #1f2933; }
nav { background: #1f2933; padding: 0.75rem 1.5rem; display: flex; gap: 1rem; align-items: center; }
nav a { color: #e4e7eb; text-decoration: none; }
nav form { margin-left: auto; }
main { max-width: 960px; margin: 2rem auto; padding: 0 1rem; }
.card { background: #fff; border-radius: 8px; padding: 1.25rem; margin-bottom: 1rem; box-shadow: 0 1px 2px rgba(0,0,0,.08); }
.grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(150px, 1fr)); gap: 1rem; }
.stat { font-size: 1.75rem; font-weight: 600; }
table { width: 100%; border-collapse: collapse; }
th, td { text-align: left; padding: 0.5rem; border-bottom: 1px solid #e4e7eb; }
.alert { padding: 0.75rem; border-radius: 6px; margin-bottom: 1rem; }
.alert-error { background: #fde8e8; color: #9b1c1c; }
.alert-success { background: #def7ec; color: #03543f; }
"#;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_students: u64,
    pub today_attendance: u64,
    pub present_count: u64,
    pub absent_count: u64,
    pub late_count: u64,
    pub attendance_rate: f64,
}

impl DashboardStats {
    /// Present students as a percentage of all students, two decimals.
    pub fn rate(present: u64, total: u64) -> f64 {
        if total == 0 {
            return 0.0;
        }
        (present as f64 / total as f64 * 10_000.0).round() / 100.0
    }
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn opt(value: &Option<String>) -> String {
    value.as_deref().map(html_escape).unwrap_or_default()
}

fn html_page(app_name: &str, title: &str, nav: bool, content: &str) -> String {
    let mut html = String::with_capacity(content.len() + 2048);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"UTF-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
    html.push_str("<title>");
    html.push_str(&html_escape(title));
    html.push_str(" - ");
    html.push_str(&html_escape(app_name));
    html.push_str("</title>\n<style>");
    html.push_str(STYLES);
    html.push_str("</style>\n</head>\n<body>\n");
    if nav {
        html.push_str("<nav>\n");
        html.push_str("<a href=\"/admin\">Dashboard</a>\n");
        html.push_str("<a href=\"/admin/students\">Students</a>\n");
        html.push_str("<a href=\"/admin/attendance\">Attendance</a>\n");
        html.push_str("<a href=\"/admin/stats\">Reports</a>\n");
        html.push_str("<form method=\"POST\" action=\"/admin/logout\"><button type=\"submit\">Log out</button></form>\n");
        html.push_str("</nav>\n");
    }
    html.push_str("<main>\n");
    html.push_str(content);
    html.push_str("\n</main>\n</body>\n</html>");
    html
}

pub fn render_login(app_name: &str, error: Option<&str>) -> String {
    let mut content = String::with_capacity(1024);
    content.push_str("<div class=\"card\">\n<h1>Admin sign in</h1>\n");
    if let Some(e) = error {
        content.push_str("<div class=\"alert alert-error\">");
        content.push_str(&html_escape(e));
        content.push_str("</div>\n");
    }
    content.push_str("<form method=\"POST\" action=\"/admin/login\">\n");
    content.push_str("<label for=\"api_key\">API key</label>\n");
    content.push_str(
        "<input type=\"password\" id=\"api_key\" name=\"api_key\" required autocomplete=\"current-password\">\n",
    );
    content.push_str("<button type=\"submit\">Sign in</button>\n</form>\n</div>");
    html_page(app_name, "Sign in", false, &content)
}

pub fn render_dashboard(app_name: &str, today: &str, stats: &DashboardStats) -> String {
    let mut content = String::with_capacity(2048);
    content.push_str("<h1>Dashboard</h1>\n<p>");
    content.push_str(&html_escape(today));
    content.push_str("</p>\n<div class=\"grid\">\n");
    let tiles = [
        ("Students", stats.total_students.to_string()),
        ("Marked today", stats.today_attendance.to_string()),
        ("Present", stats.present_count.to_string()),
        ("Absent", stats.absent_count.to_string()),
        ("Late", stats.late_count.to_string()),
        ("Attendance rate", format!("{:.2}%", stats.attendance_rate)),
    ];
    for (label, value) in tiles {
        content.push_str("<div class=\"card\"><div>");
        content.push_str(label);
        content.push_str("</div><div class=\"stat\">");
        content.push_str(&value);
        content.push_str("</div></div>\n");
    }
    content.push_str("</div>");
    html_page(app_name, "Dashboard", true, &content)
}

pub fn render_students(app_name: &str, students: &[Student]) -> String {
    let mut content = String::with_capacity(512 + students.len() * 256);
    content.push_str("<h1>Students</h1>\n<div class=\"card\">\n<table>\n");
    content.push_str("<tr><th>Code</th><th>Name</th><th>Grade</th><th>Class</th><th>Phone</th><th>Email</th></tr>\n");
    for s in students {
        content.push_str("<tr><td>");
        content.push_str(&html_escape(&s.student_code));
        content.push_str("</td><td>");
        content.push_str(&html_escape(&s.full_name()));
        content.push_str("</td><td>");
        content.push_str(&opt(&s.grade_level));
        content.push_str("</td><td>");
        content.push_str(&opt(&s.class_name));
        content.push_str("</td><td>");
        content.push_str(&opt(&s.phone));
        content.push_str("</td><td>");
        content.push_str(&opt(&s.email));
        content.push_str("</td></tr>\n");
    }
    if students.is_empty() {
        content.push_str("<tr><td colspan=\"6\">No students yet.</td></tr>\n");
    }
    content.push_str("</table>\n</div>");
    html_page(app_name, "Students", true, &content)
}

/// Marking form for `today`. `marked` pre-selects statuses already stored.
pub fn render_attendance_form(
    app_name: &str,
    today: &str,
    students: &[Student],
    marked: &[AttendanceRecord],
    success: bool,
) -> String {
    let mut content = String::with_capacity(1024 + students.len() * 512);
    content.push_str("<h1>Attendance</h1>\n");
    if success {
        content.push_str("<div class=\"alert alert-success\">Attendance saved.</div>\n");
    }
    content.push_str("<form method=\"POST\" action=\"/admin/attendance/mark\" class=\"card\">\n");
    content.push_str("<label for=\"date\">Date</label>\n");
    content.push_str("<input type=\"date\" id=\"date\" name=\"date\" value=\"");
    content.push_str(&html_escape(today));
    content.push_str("\" required>\n<table>\n<tr><th>Code</th><th>Name</th><th>Status</th></tr>\n");

    for s in students {
        let current = marked
            .iter()
            .find(|r| r.student_code == s.student_code)
            .map(|r| r.status);
        let code = html_escape(&s.student_code);
        content.push_str("<tr><td>");
        content.push_str(&code);
        content.push_str("</td><td>");
        content.push_str(&html_escape(&s.full_name()));
        content.push_str("</td><td><select name=\"status_");
        content.push_str(&code);
        content.push_str("\">\n");
        for status in AttendanceStatus::ALL {
            content.push_str("<option value=\"");
            content.push_str(status.as_str());
            content.push('"');
            if current == Some(status) {
                content.push_str(" selected");
            }
            content.push('>');
            content.push_str(status.as_str());
            content.push_str("</option>\n");
        }
        content.push_str("</select></td></tr>\n");
    }
    content.push_str("</table>\n<button type=\"submit\">Save</button>\n</form>");
    html_page(app_name, "Attendance", true, &content)
}

pub fn render_reports(
    app_name: &str,
    today: &str,
    total_students: u64,
    recent: &[AttendanceRecord],
) -> String {
    let mut content = String::with_capacity(1024 + recent.len() * 200);
    content.push_str("<h1>Reports</h1>\n<div class=\"card\">Total students: <span class=\"stat\">");
    content.push_str(&total_students.to_string());
    content.push_str("</span> <small>as of ");
    content.push_str(&html_escape(today));
    content.push_str("</small></div>\n<div class=\"card\">\n<h2>Recent attendance</h2>\n<table>\n");
    content.push_str("<tr><th>Date</th><th>Student</th><th>Status</th><th>Note</th><th>Recorded by</th></tr>\n");
    for r in recent {
        content.push_str("<tr><td>");
        content.push_str(&html_escape(&r.date));
        content.push_str("</td><td>");
        content.push_str(&html_escape(&r.student_code));
        content.push_str("</td><td>");
        content.push_str(r.status.as_str());
        content.push_str("</td><td>");
        content.push_str(&opt(&r.note));
        content.push_str("</td><td>");
        content.push_str(&opt(&r.recorded_by));
        content.push_str("</td></tr>\n");
    }
    content.push_str("</table>\n</div>");
    html_page(app_name, "Reports", true, &content)
}
