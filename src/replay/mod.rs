pub mod report;
pub mod runner;
pub mod script;

pub use report::ReplayReport;
pub use runner::ReplayRunner;
pub use script::{parse_script, ReplayStep};
