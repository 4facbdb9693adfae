//! Domain operations shared by the JSON API and the admin pages.

pub mod attendance;
pub mod notify;
pub mod students;
