pub mod driver;
pub mod script;

pub use driver::{DriverTimings, StartError, WinBuilder, WinSession, SCRIPT_FILE};
pub use script::GuestScript;
