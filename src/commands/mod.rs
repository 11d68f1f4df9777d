pub mod build;
pub mod publish;
pub mod status;
pub mod watch;

pub use build::{cmd_build, cmd_run};
pub use publish::cmd_publish;
pub use status::cmd_status;
pub use watch::cmd_watch;
