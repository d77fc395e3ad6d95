//! HAProxy configuration, backend server toggling and service control.

use crate::context::{TaskContext, WriteOptions};
use crate::env::Role;
use crate::error::Result;
use crate::task::{TaskArgs, TaskDef};

use super::write_optional_template;

pub(crate) const TASKS: &[TaskDef] = &[
    TaskDef {
        name: "haproxy_conf",
        summary: "Upload HAProxy conf",
        role: Some(Role::Lb),
        run: haproxy_conf,
    },
    TaskDef {
        name: "haproxy_enable_server",
        summary: "Enable the HAProxy backends of a server",
        role: Some(Role::Lb),
        run: haproxy_enable_server,
    },
    TaskDef {
        name: "haproxy_disable_server",
        summary: "Disable the HAProxy backends of a server",
        role: Some(Role::Lb),
        run: haproxy_disable_server,
    },
    TaskDef {
        name: "haproxy_start",
        summary: "Start HAProxy",
        role: Some(Role::Lb),
        run: haproxy_start,
    },
    TaskDef {
        name: "haproxy_stop",
        summary: "Stop HAProxy",
        role: Some(Role::Lb),
        run: haproxy_stop,
    },
    TaskDef {
        name: "haproxy_restart",
        summary: "Restart HAProxy",
        role: Some(Role::Lb),
        run: haproxy_restart,
    },
];

fn haproxy_conf(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    let remote = &ctx.defaults().services.haproxy_conf;
    log_status!("haproxy", "Writing haproxy.cfg to {}...", remote);
    write_optional_template(
        ctx,
        remote,
        "haproxy.cfg",
        WriteOptions {
            use_sudo: true,
            ..WriteOptions::default()
        },
    )?;
    Ok(())
}

fn haproxy_enable_server(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    server_action(ctx, args.required(0, "servername")?, "enable")
}

fn haproxy_disable_server(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    server_action(ctx, args.required(0, "servername")?, "disable")
}

/// One `socat` call per backend entry, joined into a single shell line.
pub fn server_action_cmd(servers: &[String], action: &str, socket: &str) -> String {
    servers
        .iter()
        .map(|server| format!("echo \"{} server {}\" | socat stdio {}", action, server, socket))
        .collect::<Vec<_>>()
        .join(";")
}

fn server_action(ctx: &TaskContext<'_>, servername: &str, action: &str) -> Result<()> {
    let backends = &ctx.env.settings.haproxy.backends;
    if backends.is_empty() {
        log_status!("warn", "HAProxy backends not defined (settings.haproxy.backends)");
        return Ok(());
    }

    let servers = backends.get(servername).ok_or_else(|| {
        ctx.abort(format!(
            "No HAProxy backends found for server {} (did you configure settings.haproxy.backends?)",
            servername
        ))
    })?;

    log_status!("haproxy", "{} {}...", action, servers.join(", "));
    let socket = &ctx.defaults().services.haproxy_stats_socket;
    ctx.sudo(server_action_cmd(servers, action, socket))?;
    Ok(())
}

fn service(ctx: &TaskContext<'_>, action: &str) -> Result<()> {
    ctx.sudo(format!("{}/haproxy {}", ctx.defaults().services.init_d, action))?;
    Ok(())
}

fn haproxy_start(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    service(ctx, "start")
}

fn haproxy_stop(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    service(ctx, "stop")
}

fn haproxy_restart(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    service(ctx, "restart")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socat_commands_are_joined() {
        let servers = vec!["www/web1".to_string(), "www-ssl/web1".to_string()];
        assert_eq!(
            server_action_cmd(&servers, "disable", "/var/lib/haproxy/stats"),
            "echo \"disable server www/web1\" | socat stdio /var/lib/haproxy/stats;\
             echo \"disable server www-ssl/web1\" | socat stdio /var/lib/haproxy/stats"
        );
    }
}
