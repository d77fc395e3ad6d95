//! Zero-domain helpers shared by core modules.

pub mod args;
pub mod shell;
pub mod suggest;
pub mod template;
