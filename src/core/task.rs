//! Task invocation, resolution and execution.
//!
//! A task spec is `name[:arg,...,key=value]`. Names resolve, in order, to a
//! script task from the site file, a task group of the active environment,
//! or a built-in task. Role-bound tasks run once per host of their role;
//! everything else runs once on the local machine.

use heck::ToSnakeCase;
use serde::Serialize;

use crate::context::{Session, TaskContext};
use crate::env::{Environment, Role};
use crate::error::{Error, Result};
use crate::executor::{Cmd, Target};
use crate::site::{ScriptStep, ScriptTask};
use crate::tasks;
use crate::utils::args::{parse_bool, split_spec, SpecArg};
use crate::utils::suggest;

pub type TaskFn = fn(&TaskContext<'_>, &TaskArgs) -> Result<()>;

/// A built-in task.
#[derive(Clone, Copy)]
pub struct TaskDef {
    pub name: &'static str,
    pub summary: &'static str,
    pub role: Option<Role>,
    pub run: TaskFn,
}

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskArgs {
    positional: Vec<String>,
    keywords: Vec<(String, String)>,
}

impl TaskArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_spec_args(args: Vec<SpecArg>) -> Self {
        let mut out = Self::default();
        for arg in args {
            match arg {
                SpecArg::Positional(value) => out.positional.push(value),
                SpecArg::Keyword(key, value) => out.keywords.push((key, value)),
            }
        }
        out
    }

    pub fn with_keyword(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.keywords.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn keywords(&self) -> &[(String, String)] {
        &self.keywords
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Argument given as `key=` or at position `index`.
    pub fn arg(&self, index: usize, key: &str) -> Option<&str> {
        self.get(key)
            .or_else(|| self.positional.get(index).map(String::as_str))
    }

    pub fn required(&self, index: usize, key: &str) -> Result<&str> {
        self.arg(index, key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::validation_missing_argument(vec![key.to_string()]))
    }

    pub fn flag(&self, index: usize, key: &str, default: bool) -> Result<bool> {
        match self.arg(index, key) {
            None => Ok(default),
            Some(raw) => parse_bool(raw).ok_or_else(|| {
                Error::validation_invalid_argument(
                    key,
                    format!("Expected a boolean, got '{}'", raw),
                    None,
                    Some(vec!["true".to_string(), "false".to_string()]),
                )
            }),
        }
    }

    /// Keyword arguments except the listed ones.
    pub fn keywords_except(&self, skip: &[&str]) -> Vec<(String, String)> {
        self.keywords
            .iter()
            .filter(|(k, _)| !skip.contains(&k.as_str()))
            .cloned()
            .collect()
    }
}

/// A parsed task spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInvocation {
    pub name: String,
    pub args: TaskArgs,
}

impl TaskInvocation {
    /// Parse `name:args`; `mysql-createdb` and `mysql_createdb` are the same task.
    pub fn parse(spec: &str) -> Result<Self> {
        let (name, args) = split_spec(spec);
        if name.is_empty() {
            return Err(Error::validation_invalid_argument(
                "task",
                "Task name is empty",
                Some(spec.to_string()),
                None,
            ));
        }
        Ok(Self {
            name: name.to_snake_case(),
            args: TaskArgs::from_spec_args(args),
        })
    }
}

// ============================================================================
// Resolution
// ============================================================================

#[derive(Clone, Copy)]
pub enum Resolved<'s> {
    Script(&'s str, &'s ScriptTask),
    Group(&'s [String]),
    Builtin(&'static TaskDef),
}

/// One line of `invdeploy tasks`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub name: String,
    pub kind: &'static str,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl<'a> Session<'a> {
    pub fn resolve(&self, env: &'a Environment, name: &str) -> Result<Resolved<'a>> {
        let site = self.site;
        if let Some((key, script)) = site
            .tasks
            .iter()
            .find(|(key, _)| key.to_snake_case() == name)
        {
            return Ok(Resolved::Script(key.as_str(), script));
        }
        if let Some(group) = env.tasks.get(name) {
            return Ok(Resolved::Group(group.as_slice()));
        }
        if let Some(def) = tasks::find(name) {
            return Ok(Resolved::Builtin(def));
        }

        let known = self.task_names(env);
        Err(Error::task_not_found(name, suggest::find_similar(name, known)))
    }

    fn task_names(&self, env: &Environment) -> Vec<String> {
        let mut names: Vec<String> = self.site.tasks.keys().cloned().collect();
        names.extend(env.tasks.keys().cloned());
        names.extend(tasks::all().map(|t| t.name.to_string()));
        names
    }

    /// Every task invocable in the active environment.
    pub fn task_list(&self) -> Result<Vec<TaskSummary>> {
        let env = self.registry.active()?;
        let mut list = Vec::new();

        for (name, script) in &self.site.tasks {
            list.push(TaskSummary {
                name: name.clone(),
                kind: "script",
                summary: script.description.clone(),
                role: script.role,
            });
        }
        for (name, steps) in &env.tasks {
            list.push(TaskSummary {
                name: name.clone(),
                kind: "group",
                summary: steps.join(", "),
                role: None,
            });
        }
        for def in tasks::all() {
            list.push(TaskSummary {
                name: def.name.to_string(),
                kind: "builtin",
                summary: def.summary.to_string(),
                role: def.role,
            });
        }
        Ok(list)
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Parse and run a task spec in the active environment.
    pub fn run_task(&self, spec: &str) -> Result<()> {
        let invocation = TaskInvocation::parse(spec)?;
        self.run_invocation(&invocation)
    }

    pub fn run_invocation(&self, invocation: &TaskInvocation) -> Result<()> {
        let env = self.registry.active()?;
        let name = invocation.name.as_str();

        if self.stack.borrow().iter().any(|n| n == name) {
            let chain = self.stack.borrow().join(" -> ");
            return Err(Error::task_aborted(format!(
                "Task {} calls itself ({} -> {}).",
                name, chain, name
            )));
        }

        let resolved = self.resolve(env, name)?;

        self.stack.borrow_mut().push(name.to_string());
        let result = self.run_resolved(env, name, resolved, &invocation.args);
        self.stack.borrow_mut().pop();
        result
    }

    /// Run every task of a group in order.
    pub fn run_group(&self, group: &str) -> Result<()> {
        let env = self.registry.active()?;
        let steps = env
            .tasks
            .get(group)
            .ok_or_else(|| Error::task_aborted(format!("No {} tasks defined.", group)))?;

        self.stack.borrow_mut().push(group.to_string());
        let result = self.run_steps(group, steps);
        self.stack.borrow_mut().pop();
        result
    }

    fn run_steps(&self, group: &str, steps: &[String]) -> Result<()> {
        for spec in steps {
            log_status!("group", "{}: {}", group, spec);
            self.run_task(spec)?;
        }
        Ok(())
    }

    fn run_resolved(
        &self,
        env: &'a Environment,
        name: &str,
        resolved: Resolved<'a>,
        args: &TaskArgs,
    ) -> Result<()> {
        match resolved {
            Resolved::Group(steps) => self.run_steps(name, steps),
            Resolved::Builtin(def) => {
                for target in self.targets(env, def.role) {
                    log_status!("task", "{} on {}", def.name, target);
                    let ctx = TaskContext::new(self, env, target, def.name);
                    (def.run)(&ctx, args)?;
                }
                Ok(())
            }
            Resolved::Script(key, script) => {
                for target in self.targets(env, script.role) {
                    log_status!("task", "{} on {}", key, target);
                    let ctx = TaskContext::new(self, env, target, key);
                    run_script(&ctx, script, args)?;
                }
                Ok(())
            }
        }
    }

    /// Hosts a task with `role` runs on; local when the role has none.
    pub fn targets(&self, env: &Environment, role: Option<Role>) -> Vec<Target> {
        let hosts = match role {
            Some(role) => env.hosts(role),
            None => &[],
        };
        if hosts.is_empty() {
            return vec![Target::Local];
        }

        let port = env.ssh_port.unwrap_or(self.defaults.ssh.default_port);
        hosts
            .iter()
            .map(|h| Target::from_host_string(h, &env.user, port, env.identity_file.as_deref()))
            .collect()
    }
}

// ============================================================================
// Script tasks
// ============================================================================

/// Run the steps of a site script task. Keyword arguments and captured
/// values are available to later steps as template variables.
pub fn run_script(ctx: &TaskContext<'_>, script: &ScriptTask, args: &TaskArgs) -> Result<()> {
    let mut vars: Vec<(&str, String)> = Vec::new();
    for (key, value) in args.keywords() {
        vars.push((key.as_str(), value.clone()));
    }
    let positional: Vec<String> = (0..args.positional().len())
        .map(|i| format!("arg{}", i))
        .collect();
    for (key, value) in positional.iter().zip(args.positional()) {
        vars.push((key.as_str(), value.clone()));
    }

    let mut captured: Vec<(String, String)> = Vec::new();

    for step in &script.steps {
        let mut extras = vars.clone();
        for (key, value) in &captured {
            extras.push((key.as_str(), value.clone()));
        }

        let (cmd, local, capture) = match step {
            ScriptStep::Task { task } => {
                ctx.execute(&ctx.render(task, &extras))?;
                continue;
            }
            ScriptStep::Confirm { confirm } => {
                ctx.confirm_or_abort(&ctx.render(confirm, &extras), "Cannot continue")?;
                continue;
            }
            ScriptStep::Sudo {
                sudo,
                user,
                capture,
                warn_only,
            } => {
                let mut cmd = Cmd::new(ctx.render(sudo, &extras));
                cmd = match user {
                    Some(user) => cmd.as_user(ctx.render(user, &extras)),
                    None => cmd.sudo(),
                };
                if *warn_only {
                    cmd = cmd.warn_only();
                }
                (cmd, false, capture)
            }
            ScriptStep::Run {
                run,
                capture,
                warn_only,
            } => {
                let mut cmd = Cmd::new(ctx.render(run, &extras));
                if *warn_only {
                    cmd = cmd.warn_only();
                }
                (cmd, false, capture)
            }
            ScriptStep::Local {
                local,
                capture,
                warn_only,
            } => {
                let mut cmd = Cmd::new(ctx.render(local, &extras));
                if *warn_only {
                    cmd = cmd.warn_only();
                }
                (cmd, true, capture)
            }
        };

        let output = if local { ctx.local_cmd(cmd)? } else { ctx.exec(cmd)? };

        if let Some(name) = capture {
            let value = output
                .stdout
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("")
                .trim()
                .to_string();
            captured.retain(|(k, _)| k != name);
            captured.push((name.clone(), value));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_names() {
        let inv = TaskInvocation::parse("mysql-createdb").unwrap();
        assert_eq!(inv.name, "mysql_createdb");
        assert!(inv.args.is_empty());

        let inv = TaskInvocation::parse("repo_make:invenio,all,install").unwrap();
        assert_eq!(inv.args.positional(), &["invenio", "all", "install"]);
    }

    #[test]
    fn args_by_position_or_keyword() {
        let inv = TaskInvocation::parse("repo_setup:invenio,ref=maint-1.1").unwrap();
        assert_eq!(inv.args.arg(0, "repo"), Some("invenio"));
        assert_eq!(inv.args.arg(1, "ref"), Some("maint-1.1"));
        assert_eq!(inv.args.get("repo"), None);
        assert!(inv.args.required(2, "other").is_err());
    }

    #[test]
    fn flags_parse_booleans() {
        let inv = TaskInvocation::parse("bootstrap:with_db=no,quiet=1").unwrap();
        assert!(!inv.args.flag(0, "with_db", true).unwrap());
        assert!(inv.args.flag(1, "quiet", false).unwrap());
        assert!(inv.args.flag(5, "missing", true).unwrap());

        let bad = TaskInvocation::parse("bootstrap:quiet=perhaps").unwrap();
        assert!(bad.args.flag(0, "quiet", false).is_err());
    }

    #[test]
    fn keywords_except_filters() {
        let inv = TaskInvocation::parse("bootstrap:quiet=1,invenio=next,inspire=prod").unwrap();
        assert_eq!(
            inv.args.keywords_except(&["quiet", "with_db"]),
            vec![
                ("invenio".to_string(), "next".to_string()),
                ("inspire".to_string(), "prod".to_string())
            ]
        );
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(TaskInvocation::parse(":x").is_err());
    }
}
