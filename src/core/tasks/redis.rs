//! Redis cache tasks.

use crate::context::TaskContext;
use crate::env::{RedisSettings, Role};
use crate::error::Result;
use crate::task::{TaskArgs, TaskDef};
use crate::utils::shell::quote_arg;

pub(crate) const TASKS: &[TaskDef] = &[TaskDef {
    name: "redis_flushdb",
    summary: "Flush the configured Redis database",
    role: Some(Role::Cache),
    run: redis_flushdb,
}];

fn redis_flushdb(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    ctx.run(redis_cli(&ctx.env.settings.redis, "flushdb"))?;
    Ok(())
}

/// `redis-cli` line honoring the password and database settings.
pub fn redis_cli(settings: &RedisSettings, command: &str) -> String {
    let mut parts = vec!["redis-cli".to_string()];
    if let Some(password) = settings.password.as_deref().filter(|p| !p.is_empty()) {
        parts.push(format!("-a {}", quote_arg(password)));
    }
    if let Some(db) = settings.db {
        parts.push(format!("-n {}", db));
    }
    parts.push(command.to_string());
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_only_when_configured() {
        assert_eq!(redis_cli(&RedisSettings::default(), "flushdb"), "redis-cli flushdb");

        let settings = RedisSettings {
            password: Some("s3cret".to_string()),
            db: Some(2),
        };
        assert_eq!(redis_cli(&settings, "flushdb"), "redis-cli -a s3cret -n 2 flushdb");
    }
}
