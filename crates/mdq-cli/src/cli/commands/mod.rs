//! CLI command handlers. Each command is in its own file.

mod add;
mod control;
mod run;
mod status;

pub use add::run_add;
pub use control::{run_cancel_all, run_control, ControlAction};
pub use run::run_queue;
pub use status::run_status;
