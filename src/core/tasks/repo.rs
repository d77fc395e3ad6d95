//! Repository checkout, configure and make tasks.
//!
//! Repositories are checked out under the source directory; with work
//! directories enabled, a `git-new-workdir` copy under the source work
//! directory is what gets built. All git and make commands run as the
//! application user.

use std::path::Path;

use crate::context::{TaskContext, WriteOptions};
use crate::env::{Hook, Repo, Role};
use crate::error::{Error, ErrorCode, Result};
use crate::executor::Cmd;
use crate::task::{TaskArgs, TaskDef};
use crate::utils::shell::quote_arg;

pub(crate) const TASKS: &[TaskDef] = &[
    TaskDef {
        name: "repo_update",
        summary: "Pull repository updates (repo=ref,...)",
        role: Some(Role::Web),
        run: repo_update,
    },
    TaskDef {
        name: "repo_setup",
        summary: "Clone repository and check out a ref",
        role: Some(Role::Web),
        run: repo_setup,
    },
    TaskDef {
        name: "repo_configure",
        summary: "Configure repository",
        role: Some(Role::Web),
        run: repo_configure,
    },
    TaskDef {
        name: "repo_make",
        summary: "Run make in repository",
        role: Some(Role::Web),
        run: repo_make,
    },
    TaskDef {
        name: "repo_install",
        summary: "Run configure and make",
        role: Some(Role::Web),
        run: repo_install,
    },
    TaskDef {
        name: "repo_prepare",
        summary: "Prepare source code after fresh checkout",
        role: Some(Role::Web),
        run: repo_prepare,
    },
    TaskDef {
        name: "repo_check",
        summary: "Show the checkout path of a repository",
        role: Some(Role::Web),
        run: repo_check_task,
    },
    TaskDef {
        name: "repo_all_configure_make",
        summary: "Configure and make one or all repositories",
        role: Some(Role::Web),
        run: repo_all_configure_make_task,
    },
    TaskDef {
        name: "git_checkout",
        summary: "Check out a git ref, stashing or resetting local changes",
        role: Some(Role::Web),
        run: git_checkout_task,
    },
    TaskDef {
        name: "git_clone",
        summary: "Clone a repository",
        role: Some(Role::Web),
        run: git_clone_task,
    },
    TaskDef {
        name: "git_fetch",
        summary: "Fetch from origin",
        role: Some(Role::Web),
        run: git_fetch_task,
    },
    TaskDef {
        name: "git_describe",
        summary: "Describe the checked out commit",
        role: Some(Role::Web),
        run: git_describe_task,
    },
    TaskDef {
        name: "git_newworkdir",
        summary: "Create the git-new-workdir copy of a repository",
        role: Some(Role::Web),
        run: git_newworkdir_task,
    },
    TaskDef {
        name: "git_reset",
        summary: "Hard reset a repository to a ref",
        role: Some(Role::Web),
        run: git_reset_task,
    },
    TaskDef {
        name: "git_show_ref",
        summary: "List refs of a repository",
        role: Some(Role::Web),
        run: git_show_ref_task,
    },
    TaskDef {
        name: "git_isdirty",
        summary: "Report uncommitted changes in a repository",
        role: Some(Role::Web),
        run: git_isdirty_task,
    },
];

// ============================================================================
// Tasks
// ============================================================================

fn repo_update(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let refs: Vec<(&str, &str)> = args
        .keywords()
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    update(ctx, &refs)
}

fn repo_setup(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let repo = args.required(0, "repo")?;
    let git_ref = args.arg(1, "ref").filter(|r| !r.is_empty());
    setup(ctx, repo, git_ref)
}

fn repo_configure(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    configure(ctx, args.required(0, "repo")?)
}

fn repo_make(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let repo = args.required(0, "repo")?;
    let targets: Vec<String> = args.positional().iter().skip(1).cloned().collect();
    make(ctx, repo, &targets)
}

fn repo_install(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let repo = args.arg(0, "repo").filter(|r| !r.is_empty());
    let key = args.arg(1, "targets_key").unwrap_or("install_targets");
    all_configure_make(ctx, repo, key)
}

fn repo_prepare(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    match args.arg(0, "repo").filter(|r| !r.is_empty()) {
        Some(repo) => prepare(ctx, repo),
        None => {
            for repo in ctx.env.repo_names() {
                prepare(ctx, &repo)?;
            }
            Ok(())
        }
    }
}

fn repo_check_task(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let workdir = args.flag(1, "workdir", false)?;
    let path = check(ctx, args.required(0, "repo")?, true, workdir)?;
    log_status!("repo", "{}", path);
    Ok(())
}

fn repo_all_configure_make_task(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let repo = args.arg(0, "repo").filter(|r| !r.is_empty());
    let key = args.arg(1, "targets_key").unwrap_or("install_targets");
    all_configure_make(ctx, repo, key)
}

fn git_checkout_task(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    git_checkout(ctx, args.required(0, "repo")?, args.required(1, "ref")?)
}

fn git_clone_task(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    git_clone(ctx, args.required(0, "repo")?)
}

fn git_fetch_task(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    git_fetch(ctx, args.required(0, "repo")?)
}

fn git_describe_task(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let repo = args.required(0, "repo")?;
    let description = git_describe(ctx, repo)?;
    log_status!("repo", "{} is at {}", repo, description);
    Ok(())
}

fn git_newworkdir_task(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    git_newworkdir(ctx, args.required(0, "repo")?)
}

fn git_reset_task(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    git_reset(ctx, args.required(0, "repo")?, args.required(1, "ref")?)
}

fn git_show_ref_task(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let topsrcdir = check(ctx, args.required(0, "repo")?, true, true)?;
    ctx.as_app_user(format!("cd {}; git show-ref", quote_arg(&topsrcdir)))?;
    Ok(())
}

fn git_isdirty_task(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let topsrcdir = check(ctx, args.required(0, "repo")?, true, true)?;
    if git_isdirty(ctx, &topsrcdir)? {
        log_status!("repo", "{} has uncommitted changes", topsrcdir);
    } else {
        log_status!("repo", "{} is clean", topsrcdir);
    }
    Ok(())
}

// ============================================================================
// Repository operations
// ============================================================================

/// Validate `repo` and return its checkout path. With `check_path`, the
/// path must exist on the target.
pub fn check(ctx: &TaskContext<'_>, repo: &str, check_path: bool, workdir: bool) -> Result<String> {
    if ctx.env.repo(repo).is_none() {
        return Err(Error::repo_not_found(repo, ctx.env.repo_names()));
    }

    let path = ctx.env.repo_path(repo, workdir);
    if check_path && !ctx.exists(&path, false)? {
        return Err(ctx.abort(format!("Repository does not exists {}", path)));
    }
    Ok(path)
}

fn repo_def<'e>(ctx: &'e TaskContext<'_>, repo: &str) -> Result<&'e Repo> {
    ctx.env
        .repo(repo)
        .ok_or_else(|| Error::repo_not_found(repo, ctx.env.repo_names()))
}

/// Update every repository: explicit `repo=ref` pairs override the refs of
/// the environment; a repository without a git directory is set up.
pub fn update(ctx: &TaskContext<'_>, refs: &[(&str, &str)]) -> Result<()> {
    if let Some((unknown, _)) = refs.iter().find(|(repo, _)| ctx.env.repo(repo).is_none()) {
        return Err(ctx.abort(format!("Invalid repository {}", unknown)));
    }

    let plan: Vec<(String, Option<String>)> = ctx
        .env
        .repos
        .iter()
        .map(|repo| {
            let git_ref = match refs.iter().find(|(name, _)| *name == repo.name) {
                Some((_, r)) if r.is_empty() => None,
                Some((_, r)) => Some(r.to_string()),
                None => repo.git_ref.clone(),
            };
            (repo.name.clone(), git_ref)
        })
        .collect();

    for (repo, git_ref) in plan {
        let topsrcdir = check(ctx, &repo, false, true)?;
        let gitdir = format!("{}/.git", topsrcdir);

        if !ctx.exists(&gitdir, false)? {
            setup(ctx, &repo, git_ref.as_deref())?;
            continue;
        }

        match git_ref {
            Some(git_ref) => {
                log_status!("repo", "Updating repository {} to ref {}...", repo, git_ref);
                git_fetch(ctx, &repo)?;
                git_checkout(ctx, &repo, &git_ref)?;
            }
            None => {
                let commit = git_describe(ctx, &repo)?;
                log_status!(
                    "repo",
                    "No ref specified for repository {} (currently at HEAD, commit {})",
                    repo,
                    commit
                );
            }
        }
    }

    Ok(())
}

/// Clone `repo`, create its work directory, check out `git_ref` and
/// prepare the sources.
pub fn setup(ctx: &TaskContext<'_>, repo: &str, git_ref: Option<&str>) -> Result<()> {
    log_status!(
        "repo",
        "Setting up repository {} with ref {}...",
        repo,
        git_ref.unwrap_or("(none)")
    );

    let topsrcdir = check(ctx, repo, false, false)?;
    let workdir = check(ctx, repo, false, true)?;
    let gitdir = format!("{}/.git", topsrcdir);
    let srcdir = &ctx.env.srcdir;

    if !ctx.exists(srcdir, false)? {
        ctx.confirm_or_abort(
            &format!("Create repository root {}?", srcdir),
            "Cannot continue",
        )?;
        ctx.as_app_user(format!("mkdir -p {}", quote_arg(srcdir)))?;
    }

    if !ctx.exists(&gitdir, false)? && ctx.exists(&topsrcdir, false)? {
        ctx.confirm_or_abort(
            &format!(
                "Remove {} (it does not seem to be a git repository)?",
                topsrcdir
            ),
            "Cannot continue",
        )?;
        ctx.as_app_user(format!("rm -Rf {}", quote_arg(&topsrcdir)))?;
    }

    if !ctx.exists(&gitdir, false)? {
        git_clone(ctx, repo)?;
    }
    if !ctx.exists(&workdir, false)? {
        git_newworkdir(ctx, repo)?;
    }
    if let Some(git_ref) = git_ref {
        git_checkout(ctx, repo, git_ref)?;
    }
    prepare(ctx, repo)
}

pub fn configure(ctx: &TaskContext<'_>, repo: &str) -> Result<()> {
    let topsrcdir = check(ctx, repo, true, true)?;
    log_status!("repo", "Configuring repository: {}...", repo);

    let hook = repo_def(ctx, repo)?.configure_hook.clone();
    run_hook(ctx, &hook, "configure_hook", &topsrcdir)
}

pub fn prepare(ctx: &TaskContext<'_>, repo: &str) -> Result<()> {
    let topsrcdir = check(ctx, repo, true, true)?;
    let hook = repo_def(ctx, repo)?.prepare_hook.clone();
    run_hook(ctx, &hook, "prepare_hook", &topsrcdir)
}

/// Run make for `targets`, or the repository's install targets when empty.
pub fn make(ctx: &TaskContext<'_>, repo: &str, targets: &[String]) -> Result<()> {
    let topsrcdir = check(ctx, repo, true, true)?;

    let targets: Vec<String> = if targets.is_empty() {
        repo_def(ctx, repo)?.install_targets.clone()
    } else {
        targets.to_vec()
    };
    if targets.is_empty() {
        return Err(ctx.abort(format!(
            "No default targets found for repository {}",
            repo
        )));
    }

    log_status!(
        "repo",
        "Running make for {} targets: {}...",
        repo,
        targets.join(" ")
    );
    ctx.as_app_user(format!(
        "cd {} && make {}",
        quote_arg(&topsrcdir),
        targets.join(" ")
    ))?;
    Ok(())
}

/// Configure every selected repository, then make each with the targets
/// stored under `targets_key`.
pub fn all_configure_make(ctx: &TaskContext<'_>, repo: Option<&str>, targets_key: &str) -> Result<()> {
    let repos: Vec<Repo> = match repo {
        Some(name) => {
            check(ctx, name, true, false)?;
            vec![repo_def(ctx, name)?.clone()]
        }
        None => ctx.env.repos.clone(),
    };

    for repo in &repos {
        configure(ctx, &repo.name)?;
    }

    for repo in &repos {
        let targets = match repo.targets(targets_key) {
            Some(targets) => targets.to_vec(),
            None => vec!["all".to_string(), "install".to_string()],
        };
        make(ctx, &repo.name, &targets)?;
    }

    Ok(())
}

// ============================================================================
// Hooks
// ============================================================================

fn run_hook(ctx: &TaskContext<'_>, hook: &Hook, hook_name: &str, topsrcdir: &str) -> Result<()> {
    let extras = [("topsrcdir", topsrcdir.to_string())];

    match hook {
        Hook::None => {
            log_status!("repo", "No hook found for {}", hook_name);
            Ok(())
        }
        Hook::Default if hook_name == "configure_hook" => {
            log_status!("repo", "Running hook default_configure_hook");
            default_configure_hook(ctx, topsrcdir)
        }
        Hook::Default => {
            log_status!("repo", "Running hook default_prepare_hook");
            default_prepare_hook(ctx, topsrcdir)
        }
        Hook::Template {
            template,
            destination,
        } => {
            let destination = ctx.render(destination, &extras);
            log_status!("repo", "Running hook template ({} -> {})", template, destination);
            ctx.write_template(
                &destination,
                template,
                WriteOptions {
                    extras: &extras,
                    ..WriteOptions::default()
                },
            )
        }
        Hook::Commands { commands } => {
            log_status!("repo", "Running hook commands ({})", commands.len());
            for command in commands {
                ctx.as_app_user(ctx.render(command, &extras))?;
            }
            Ok(())
        }
    }
}

/// `./configure` with the installation prefix and its python.
fn default_configure_hook(ctx: &TaskContext<'_>, topsrcdir: &str) -> Result<()> {
    let dir = quote_arg(topsrcdir);
    let prefix = &ctx.env.prefix;

    if ctx.exists(&format!("{}/configure", topsrcdir), false)? {
        ctx.exec(
            Cmd::new(format!("cd {} && make -s clean", dir))
                .as_user(ctx.env.invenio_user.clone())
                .warn_only(),
        )?;
    }
    ctx.as_app_user(format!(
        "cd {} && ./configure --prefix={} --with-python={}/bin/python",
        dir, prefix, prefix
    ))?;
    ctx.as_app_user(format!("cd {} && make -s clean", dir))?;
    Ok(())
}

/// Regenerate autotools files when the checkout has a `configure.ac`.
fn default_prepare_hook(ctx: &TaskContext<'_>, topsrcdir: &str) -> Result<()> {
    if ctx.exists(&format!("{}/configure.ac", topsrcdir), false)? {
        ctx.as_app_user(format!(
            "cd {}; aclocal && automake -a && autoconf -f",
            quote_arg(topsrcdir)
        ))?;
    }
    Ok(())
}

// ============================================================================
// Git helpers
// ============================================================================

pub fn git_describe(ctx: &TaskContext<'_>, repo: &str) -> Result<String> {
    let topsrcdir = check(ctx, repo, true, true)?;
    let version_gen = format!("{}/git-version-gen", topsrcdir);
    let dir = quote_arg(&topsrcdir);

    let line = if ctx.exists(&version_gen, false)? {
        format!("cd {}; {}", dir, quote_arg(&version_gen))
    } else {
        format!("cd {}; git describe --always --abbrev=4 HEAD", dir)
    };
    ctx.capture(Cmd::new(line).as_user(ctx.env.invenio_user.clone()))
}

pub fn git_reset(ctx: &TaskContext<'_>, repo: &str, git_ref: &str) -> Result<()> {
    let topsrcdir = check(ctx, repo, true, true)?;
    ctx.as_app_user(format!(
        "cd {}; git reset --hard {}",
        quote_arg(&topsrcdir),
        quote_arg(git_ref)
    ))?;
    Ok(())
}

/// Create the work directory copy when work directories are enabled and
/// differ from the source directory.
pub fn git_newworkdir(ctx: &TaskContext<'_>, repo: &str) -> Result<()> {
    let env = ctx.env;
    if !env.with_workdir || env.srcdir == env.srcworkdir {
        return Ok(());
    }

    let srcdir = check(ctx, repo, false, false)?;
    let srcworkdir = check(ctx, repo, false, true)?;
    ctx.as_app_user(format!(
        "{}/bin/git-new-workdir {} {}",
        env.prefix,
        quote_arg(&srcdir),
        quote_arg(&srcworkdir)
    ))?;
    Ok(())
}

/// Whether `dir` has uncommitted changes.
pub fn git_isdirty(ctx: &TaskContext<'_>, dir: &str) -> Result<bool> {
    let cmd = Cmd::new(format!("cd {} && git diff-index --exit-code HEAD --", quote_arg(dir)))
        .as_user(ctx.env.invenio_user.clone())
        .warn_only()
        .quiet();
    Ok(ctx.exec(cmd)?.exit_code != 0)
}

/// Check out `git_ref`. Uncommitted changes are stashed or reset after
/// confirmation; refusing both aborts.
pub fn git_checkout(ctx: &TaskContext<'_>, repo: &str, git_ref: &str) -> Result<()> {
    let topsrcdir = check(ctx, repo, true, true)?;
    let dir = quote_arg(&topsrcdir);

    if git_isdirty(ctx, &topsrcdir)? {
        let stash = ctx.confirm(
            &format!(
                "Working directory {} contains uncommited changes. Do you want to stash the changes?",
                topsrcdir
            ),
            true,
        )?;

        if stash {
            ctx.as_app_user(format!("cd {}; git stash", dir))?;
        } else if ctx.confirm("Do you want to reset the changes (required to continue)?", true)? {
            ctx.as_app_user(format!("cd {}; git reset --hard HEAD", dir))?;
        } else {
            return Err(ctx.abort(
                "Cannot continue unless uncommitted changes are stashed or reset.",
            ));
        }
    }

    ctx.as_app_user(format!("cd {}; git checkout -f {}", dir, quote_arg(git_ref)))?;
    Ok(())
}

pub fn git_clone(ctx: &TaskContext<'_>, repo: &str) -> Result<()> {
    let topsrcdir = check(ctx, repo, false, false)?;
    let url = repo_def(ctx, repo)?.repository.clone();
    if url.is_empty() {
        return Err(ctx.abort(format!("Repository URL for {} not defined", repo)));
    }

    let path = Path::new(&topsrcdir);
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| repo.to_string());
    let parent = path
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ctx.env.srcdir.clone());

    if ctx.exists(&topsrcdir, false)? {
        ctx.confirm_or_abort(
            &format!("Remove existing source code in {} ?", topsrcdir),
            "Cannot continue",
        )?;
        ctx.as_app_user(format!("rm -Rf {}", quote_arg(&topsrcdir)))?;
    } else if !ctx.exists(&parent, false)? {
        ctx.as_app_user(format!("mkdir -p {}", quote_arg(&parent)))?;
    }

    ctx.as_app_user(format!(
        "cd {}; git clone {} {}",
        quote_arg(&parent),
        quote_arg(&url),
        quote_arg(&basename)
    ))
    .map_err(|e| {
        if e.code != ErrorCode::RemoteCommandFailed {
            return e;
        }
        let err = Error::git_command_failed(format!("git clone of {} failed", url));
        match e.details["stderr"].as_str().map(str::trim) {
            Some(stderr) if !stderr.is_empty() => err.with_hint(stderr.to_string()),
            _ => err,
        }
    })?;
    Ok(())
}

pub fn git_fetch(ctx: &TaskContext<'_>, repo: &str) -> Result<()> {
    let topsrcdir = check(ctx, repo, true, false)?;
    ctx.as_app_user(format!("cd {}; git fetch origin", quote_arg(&topsrcdir)))?;
    Ok(())
}
