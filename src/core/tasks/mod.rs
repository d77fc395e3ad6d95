//! Built-in task library.
//!
//! Each module exposes a `TASKS` table; [`all`] and [`find`] walk them in
//! module order.

use std::path::PathBuf;

use crate::context::{TaskContext, WriteOptions};
use crate::error::{ErrorCode, Result};
use crate::task::TaskDef;

pub mod apache;
pub mod bibsched;
pub mod celery;
pub mod compound;
pub mod devserver;
pub mod fixtures;
pub mod haproxy;
pub mod invenio;
pub mod mysql;
pub mod python;
pub mod rabbitmq;
pub mod redis;
pub mod repo;
pub mod system;
pub mod venv;

const MODULES: &[&[TaskDef]] = &[
    compound::TASKS,
    repo::TASKS,
    mysql::TASKS,
    apache::TASKS,
    bibsched::TASKS,
    celery::TASKS,
    haproxy::TASKS,
    rabbitmq::TASKS,
    redis::TASKS,
    python::TASKS,
    system::TASKS,
    invenio::TASKS,
    devserver::TASKS,
    venv::TASKS,
    fixtures::TASKS,
];

/// Every built-in task.
pub fn all() -> impl Iterator<Item = &'static TaskDef> {
    MODULES.iter().flat_map(|tasks| tasks.iter())
}

pub fn find(name: &str) -> Option<&'static TaskDef> {
    all().find(|task| task.name == name)
}

/// Write a template that may legitimately be absent from the site. Returns
/// whether anything was written.
pub(crate) fn write_optional_template(
    ctx: &TaskContext<'_>,
    remote: &str,
    template: &str,
    opts: WriteOptions<'_>,
) -> Result<bool> {
    match ctx.write_template(remote, template, opts) {
        Ok(()) => Ok(true),
        Err(err) if err.code == ErrorCode::TemplateNotFound => {
            log_status!("warn", "Could not find template {}", template);
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Resolve a path given in the site file against the site directory.
pub(crate) fn site_file(ctx: &TaskContext<'_>, name: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(name).to_string());
    if expanded.is_absolute() {
        return expanded;
    }
    ctx.session
        .site()
        .path
        .parent()
        .map(|dir| dir.join(&expanded))
        .unwrap_or(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn task_names_are_unique() {
        let mut seen = HashSet::new();
        for task in all() {
            assert!(seen.insert(task.name), "duplicate task {}", task.name);
        }
    }

    #[test]
    fn find_by_name() {
        assert_eq!(find("mysql_createdb").map(|t| t.name), Some("mysql_createdb"));
        assert!(find("mysql-createdb").is_none());
        assert!(find("bootstrap").is_some());
    }
}
