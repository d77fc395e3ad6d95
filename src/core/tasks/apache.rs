//! Apache httpd tasks.

use crate::context::TaskContext;
use crate::env::Role;
use crate::error::Result;
use crate::task::{TaskArgs, TaskDef};

pub(crate) const TASKS: &[TaskDef] = &[
    TaskDef {
        name: "apache_prepare",
        summary: "Start httpd and enable it at boot",
        role: Some(Role::Web),
        run: apache_prepare,
    },
    TaskDef {
        name: "apache_configure",
        summary: "Add the Invenio directives to httpd.conf",
        role: Some(Role::Web),
        run: apache_configure,
    },
    TaskDef {
        name: "apache_clean",
        summary: "Remove the directives added by apache_configure",
        role: Some(Role::Web),
        run: apache_clean,
    },
    TaskDef {
        name: "apache_restart",
        summary: "Restart httpd",
        role: Some(Role::Web),
        run: apache_restart,
    },
];

const ERROR_ALIAS: &str = "^Alias /error/ .+";
const ERROR_ALIAS_ESCAPED: &str = "Alias \\/error\\/ .+";

/// Lines `apache_configure` adds to httpd.conf.
pub fn httpd_conf_extras(prefix: &str) -> Vec<String> {
    vec![
        format!("Include {}/etc/apache/invenio-apache-vhost.conf", prefix),
        format!("Include {}/etc/apache/invenio-apache-vhost-ssl.conf", prefix),
        "TraceEnable off".to_string(),
        "SSLProtocol all -SSLv2".to_string(),
    ]
}

fn apache_prepare(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    let services = &ctx.defaults().services;
    ctx.sudo(format!("{} httpd start", services.service))?;
    ctx.sudo(format!("{} httpd on", services.chkconfig))?;
    Ok(())
}

fn apache_configure(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    let conf = &ctx.defaults().services.httpd_conf;
    ctx.append(conf, &httpd_conf_extras(&ctx.env.prefix), true)?;
    ctx.comment(conf, ERROR_ALIAS, true)
}

fn apache_clean(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    let conf = &ctx.defaults().services.httpd_conf;
    for line in httpd_conf_extras(&ctx.env.prefix) {
        ctx.sed(conf, &line, "", true)?;
    }
    ctx.uncomment(conf, ERROR_ALIAS_ESCAPED, true)
}

fn apache_restart(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    ctx.sudo(format!("{} httpd restart", ctx.defaults().services.service))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extras_follow_prefix() {
        let extras = httpd_conf_extras("/opt/invenio");
        assert_eq!(extras[0], "Include /opt/invenio/etc/apache/invenio-apache-vhost.conf");
        assert_eq!(extras.len(), 4);
    }
}
