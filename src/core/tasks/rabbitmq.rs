//! RabbitMQ users, vhosts and permissions.

use crate::context::TaskContext;
use crate::env::Role;
use crate::error::Result;
use crate::task::{TaskArgs, TaskDef};
use crate::utils::shell::quote_args;

pub(crate) const TASKS: &[TaskDef] = &[
    TaskDef {
        name: "rabbitmq_add_user",
        summary: "Add a RabbitMQ user",
        role: Some(Role::Web),
        run: rabbitmq_add_user,
    },
    TaskDef {
        name: "rabbitmq_add_vhost",
        summary: "Add a RabbitMQ vhost",
        role: Some(Role::Web),
        run: rabbitmq_add_vhost,
    },
    TaskDef {
        name: "rabbitmq_set_user_permissions",
        summary: "Grant a user full access to a vhost and tag it (default: management)",
        role: Some(Role::Web),
        run: rabbitmq_set_user_permissions,
    },
];

/// Tags given to users when none are listed.
pub const DEFAULT_TAGS: &[&str] = &["management"];

fn rabbitmqctl(ctx: &TaskContext<'_>, args: &[&str]) -> Result<()> {
    ctx.sudo(format!("rabbitmqctl {}", quote_args(args)))?;
    Ok(())
}

fn rabbitmq_add_user(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let user = args.required(0, "user")?;
    let password = args.required(1, "password")?;
    rabbitmqctl(ctx, &["add_user", user, password])
}

fn rabbitmq_add_vhost(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    rabbitmqctl(ctx, &["add_vhost", args.required(0, "name")?])
}

fn rabbitmq_set_user_permissions(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let vhost = args.required(0, "vhost")?;
    let user = args.required(1, "user")?;

    let mut tags: Vec<&str> = args.positional().iter().skip(2).map(String::as_str).collect();
    if let Some(listed) = args.get("tags") {
        tags.extend(listed.split_whitespace());
    }
    if tags.is_empty() {
        tags = DEFAULT_TAGS.to_vec();
    }

    rabbitmqctl(ctx, &["set_permissions", "-p", vhost, user, ".*", ".*", ".*"])?;
    for tag in tags {
        rabbitmqctl(ctx, &["set_user_tags", user, tag])?;
    }
    Ok(())
}
