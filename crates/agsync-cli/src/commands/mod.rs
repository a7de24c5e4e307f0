//! Command implementations

mod connect;
mod folder;
mod password;
mod status;
mod sync;
mod watch;

pub use connect::{run_connect, run_disconnect, run_init, ConnectArgs};
pub use folder::run_folder;
pub use password::run_reset_password;
pub use status::run_status;
pub use sync::{run_pull, run_push, run_sync};
pub use watch::run_watch;
