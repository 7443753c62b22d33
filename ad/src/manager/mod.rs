//! Module manager
//!
//! The ModuleManager owns every module and drives their actions:
//! - **Startup:** first `finish_tasks()` imports context, compiles templates
//!   and runs commands of every `on_startup` block, then starts the watcher
//! - **Event:** later `finish_tasks()` calls repeat this for `on_event` when
//!   the combined module events change
//! - **Modified:** `modified()` routes watcher notifications to
//!   `on_modified.<template>` blocks, or reloads the config
//!
//! All calls into a manager must be serialized by its owner.

mod core;
mod error;

pub use self::core::{ModifiedOutcome, ModuleManager};
pub use error::ManagerError;
