// Public modules
pub mod console;
pub mod context;
pub mod env;
pub mod error;
pub mod executor;
pub mod files;
pub mod site;
pub mod ssh;
pub mod task;
pub mod tasks;
pub mod templates;

// Internal modules - not part of public API
pub(crate) mod config;
pub(crate) mod paths;

// Public modules for CLI access
pub mod defaults;

// Re-export common types for convenience
pub use console::{AssumeYes, Console, NoConsole, ScriptedConsole};
pub use context::{Session, TaskContext};
pub use env::{Environment, Registry, Role};
pub use error::{Error, ErrorCode, Result};
pub use executor::{Cmd, CommandOutput, CommandRecord, RecordingRunner, Runner, SystemRunner, Target};
pub use site::Site;
pub use task::{TaskArgs, TaskInvocation};
