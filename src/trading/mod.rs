pub mod desk;
pub mod executor;
pub mod prefs;

pub use desk::{Desk, Outcome, Reply};
pub use prefs::DashboardPrefs;
