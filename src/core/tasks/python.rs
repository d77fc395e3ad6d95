//! System Python setup for installations outside a virtualenv.

use std::path::Path;

use crate::context::TaskContext;
use crate::env::Role;
use crate::error::Result;
use crate::task::{TaskArgs, TaskDef};

use super::system::python_version;

pub(crate) const TASKS: &[TaskDef] = &[
    TaskDef {
        name: "python_prepare",
        summary: "Setup Python symlinks",
        role: Some(Role::Web),
        run: python_prepare,
    },
    TaskDef {
        name: "python_clean",
        summary: "Remove Python symlinks",
        role: Some(Role::Web),
        run: python_clean,
    },
];

/// `site-packages/invenio` links pointing into the installation.
pub fn site_package_links(pyver: &str) -> Vec<String> {
    ["/usr/lib64", "/usr/lib"]
        .iter()
        .map(|lib| format!("{}/python{}/site-packages/invenio", lib, pyver))
        .collect()
}

fn python_prepare(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    let pyver = python_version(ctx, &ctx.env.python)?;
    let prefix = &ctx.env.prefix;
    let user = &ctx.env.invenio_user;
    let package = format!("{}/lib/python/invenio", prefix);

    if let Some(parent) = Path::new(prefix).parent().map(|p| p.display().to_string()) {
        if !parent.is_empty() && parent != "/" {
            ctx.sudo(format!("chgrp {} {}", user, parent))?;
            ctx.sudo(format!("chmod g+w {}", parent))?;
        }
    }
    ctx.sudo(format!("mkdir -p {}", package))?;
    ctx.sudo(format!("chown -R {} {}/", user, prefix))?;

    for link in site_package_links(&pyver) {
        if !ctx.exists(&link, false)? {
            ctx.sudo(format!("ln -s {} {}", package, link))?;
        }
    }
    Ok(())
}

fn python_clean(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    let pyver = python_version(ctx, &ctx.env.python)?;
    for link in site_package_links(&pyver) {
        if ctx.exists(&link, false)? {
            ctx.sudo(format!("rm -f {}", link))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_cover_both_lib_dirs() {
        assert_eq!(
            site_package_links("2.6"),
            vec![
                "/usr/lib64/python2.6/site-packages/invenio".to_string(),
                "/usr/lib/python2.6/site-packages/invenio".to_string(),
            ]
        );
    }
}
