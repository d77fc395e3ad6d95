//! Run session and per-host task context.
//!
//! A [`Session`] owns everything shared by one invocation of the tool: the
//! site, the environment registry, the runner, the console and the run
//! report. A [`TaskContext`] is handed to each task body and binds the
//! session to one environment and one target host.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::console::Console;
use crate::defaults::Defaults;
use crate::env::{Environment, Registry};
use crate::error::{Error, RemoteCommandFailedDetails, Result, TargetDetails};
use crate::executor::{Cmd, CommandOutput, CommandRecord, Runner, Target};
use crate::files;
use crate::site::Site;
use crate::task::{TaskArgs, TaskInvocation};
use crate::templates::TemplateStore;
use crate::utils::template;

// ============================================================================
// Session
// ============================================================================

pub struct Session<'a> {
    pub(crate) site: &'a Site,
    pub(crate) registry: &'a Registry,
    pub(crate) runner: &'a dyn Runner,
    pub(crate) console: &'a dyn Console,
    pub(crate) defaults: Defaults,
    pub(crate) templates: TemplateStore,
    report: RefCell<Vec<CommandRecord>>,
    /// Names of the tasks currently executing, outermost first.
    pub(crate) stack: RefCell<Vec<String>>,
    /// Values entered during the run (prompted passwords) that later
    /// templates must see.
    remembered: RefCell<BTreeMap<String, String>>,
    /// Probe results per host (`slc_version`, `python_version`).
    probes: RefCell<HashMap<(String, String), Option<String>>>,
}

impl<'a> Session<'a> {
    pub fn new(
        site: &'a Site,
        registry: &'a Registry,
        runner: &'a dyn Runner,
        console: &'a dyn Console,
    ) -> Self {
        Self {
            site,
            registry,
            runner,
            console,
            defaults: Defaults::default(),
            templates: TemplateStore::new(site.templates_dir()),
            report: RefCell::new(Vec::new()),
            stack: RefCell::new(Vec::new()),
            remembered: RefCell::new(BTreeMap::new()),
            probes: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn site(&self) -> &Site {
        self.site
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub fn is_live(&self) -> bool {
        self.runner.is_live()
    }

    /// Commands executed so far.
    pub fn report(&self) -> Vec<CommandRecord> {
        self.report.borrow().clone()
    }

    pub fn take_report(&self) -> Vec<CommandRecord> {
        std::mem::take(&mut *self.report.borrow_mut())
    }

    pub(crate) fn remember(&self, key: &str, value: &str) {
        self.remembered
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    pub(crate) fn remembered(&self, key: &str) -> Option<String> {
        self.remembered.borrow().get(key).cloned()
    }

    fn record(&self, record: CommandRecord) {
        self.report.borrow_mut().push(record);
    }
}

// ============================================================================
// Task context
// ============================================================================

/// Options for [`TaskContext::write_template`].
#[derive(Debug, Clone, Default)]
pub struct WriteOptions<'o> {
    pub use_sudo: bool,
    /// Splice into the existing file between `# BEGIN <mark>` / `# END <mark>`.
    pub mark: Option<&'o str>,
    /// Extra template variables, overriding the environment ones.
    pub extras: &'o [(&'o str, String)],
}

pub struct TaskContext<'a> {
    pub session: &'a Session<'a>,
    pub env: &'a Environment,
    pub target: Target,
    pub task: String,
}

impl<'a> TaskContext<'a> {
    pub fn new(
        session: &'a Session<'a>,
        env: &'a Environment,
        target: Target,
        task: impl Into<String>,
    ) -> Self {
        Self {
            session,
            env,
            target,
            task: task.into(),
        }
    }

    pub fn defaults(&self) -> &Defaults {
        &self.session.defaults
    }

    /// User the command session is logged in as.
    pub fn login_user(&self) -> String {
        login_user(&self.target)
    }

    // ------------------------------------------------------------------------
    // Command execution
    // ------------------------------------------------------------------------

    /// Execute a command on this context's target.
    pub fn exec(&self, cmd: Cmd) -> Result<CommandOutput> {
        let target = self.target.clone();
        self.exec_on(&target, cmd)
    }

    fn exec_on(&self, target: &Target, cmd: Cmd) -> Result<CommandOutput> {
        let line = cmd.render(&login_user(target));
        let shown = cmd.masked(&line);

        if !cmd.quiet {
            log_status!("run", "[{}] {}", target, shown);
        }

        let output = self.session.runner.execute(target, &line, &cmd)?;

        self.session.record(CommandRecord {
            task: self.task.clone(),
            target: target.to_string(),
            command: shown.clone(),
            exit_code: output.exit_code,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
        });

        if !output.success && !cmd.warn_only {
            return Err(Error::remote_command_failed(RemoteCommandFailedDetails {
                command: shown,
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
                target: TargetDetails {
                    environment: Some(self.env.name.clone()),
                    task: Some(self.task.clone()),
                    host: match target {
                        Target::Local => None,
                        Target::Remote { host, .. } => Some(host.clone()),
                    },
                },
            }));
        }

        if !output.success {
            log_status!(
                "warn",
                "Command exited with {} (ignored): {}",
                output.exit_code,
                shown
            );
        }

        Ok(output)
    }

    pub fn run(&self, line: impl Into<String>) -> Result<CommandOutput> {
        self.exec(Cmd::new(line))
    }

    pub fn sudo(&self, line: impl Into<String>) -> Result<CommandOutput> {
        self.exec(Cmd::new(line).sudo())
    }

    pub fn sudo_as(&self, line: impl Into<String>, user: &str) -> Result<CommandOutput> {
        self.exec(Cmd::new(line).as_user(user))
    }

    /// Run as the user owning the installation.
    pub fn as_app_user(&self, line: impl Into<String>) -> Result<CommandOutput> {
        self.exec(Cmd::new(line).as_user(self.env.invenio_user.clone()))
    }

    /// Run on the machine the tool runs on, whatever the target.
    pub fn local(&self, line: impl Into<String>) -> Result<CommandOutput> {
        self.exec_on(&Target::Local, Cmd::new(line))
    }

    pub fn local_cmd(&self, cmd: Cmd) -> Result<CommandOutput> {
        self.exec_on(&Target::Local, cmd)
    }

    /// Run and return trimmed stdout.
    pub fn capture(&self, cmd: Cmd) -> Result<String> {
        Ok(self.exec(cmd)?.stdout.trim().to_string())
    }

    // ------------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------------

    pub fn exists(&self, path: &str, use_sudo: bool) -> Result<bool> {
        let cmd = Cmd::new(files::exists_cmd(path))
            .use_sudo(use_sudo)
            .warn_only()
            .quiet();
        Ok(self.exec(cmd)?.success)
    }

    pub fn exists_local(&self, path: &str) -> Result<bool> {
        let cmd = Cmd::new(files::exists_cmd(path)).warn_only().quiet();
        Ok(self.local_cmd(cmd)?.success)
    }

    pub fn contains(&self, file: &str, text: &str, use_sudo: bool) -> Result<bool> {
        let cmd = Cmd::new(files::contains_cmd(file, text, false))
            .use_sudo(use_sudo)
            .warn_only()
            .quiet();
        Ok(self.exec(cmd)?.success)
    }

    /// Append each line not already present in `file`.
    pub fn append<S: AsRef<str>>(&self, file: &str, lines: &[S], use_sudo: bool) -> Result<()> {
        for line in lines {
            let line = line.as_ref();
            let present = Cmd::new(files::contains_cmd(file, line, true))
                .use_sudo(use_sudo)
                .warn_only()
                .quiet();
            if self.exec(present)?.success {
                continue;
            }
            self.exec(Cmd::new(files::append_line_cmd(file, line)).use_sudo(use_sudo))?;
        }
        Ok(())
    }

    pub fn sed(&self, file: &str, before: &str, after: &str, use_sudo: bool) -> Result<()> {
        self.exec(Cmd::new(files::sed_cmd(file, before, after, None)).use_sudo(use_sudo))?;
        Ok(())
    }

    pub fn comment(&self, file: &str, regex: &str, use_sudo: bool) -> Result<()> {
        self.exec(Cmd::new(files::comment_cmd(file, regex)).use_sudo(use_sudo))?;
        Ok(())
    }

    pub fn uncomment(&self, file: &str, regex: &str, use_sudo: bool) -> Result<()> {
        self.exec(Cmd::new(files::uncomment_cmd(file, regex)).use_sudo(use_sudo))?;
        Ok(())
    }

    /// Upload `content` to `remote`.
    pub fn put_content(&self, content: &[u8], remote: &str, use_sudo: bool) -> Result<()> {
        let cmd = Cmd::new(files::write_stdin_cmd(remote))
            .use_sudo(use_sudo)
            .stdin(content.to_vec());
        self.exec(cmd)?;
        Ok(())
    }

    /// Upload a local file to `remote`.
    pub fn put(&self, local: &Path, remote: &str, use_sudo: bool) -> Result<()> {
        let content = std::fs::read(local).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read {}", local.display())))
        })?;
        self.put_content(&content, remote, use_sudo)
    }

    /// Contents of `path`, or `None` when it does not exist.
    pub fn read_remote(&self, path: &str, use_sudo: bool) -> Result<Option<String>> {
        if !self.exists(path, use_sudo)? {
            return Ok(None);
        }
        let out = self.exec(Cmd::new(files::read_cmd(path)).use_sudo(use_sudo).quiet())?;
        Ok(Some(out.stdout))
    }

    /// Render `template` and write it to `remote`.
    pub fn write_template(&self, remote: &str, template: &str, opts: WriteOptions<'_>) -> Result<()> {
        let mut vars = self.template_vars();
        for (key, value) in opts.extras {
            vars.insert(key.to_string(), value.clone());
        }

        let rendered = self
            .session
            .templates
            .render(&self.env.name, template, &vars)?;

        let content = match opts.mark {
            Some(mark) => {
                let existing = self.read_remote(remote, opts.use_sudo)?.unwrap_or_default();
                files::splice_marked_block(&existing, mark, &rendered)
            }
            None => rendered,
        };

        log_status!("template", "Writing {} to {}", template, remote);
        self.put_content(content.as_bytes(), remote, opts.use_sudo)
    }

    // ------------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------------

    /// Variables available to templates and script steps on this target.
    pub fn template_vars(&self) -> HashMap<String, String> {
        let mut vars: HashMap<String, String> = self.env.template_vars().into_iter().collect();
        vars.insert("host".to_string(), self.target.host().to_string());
        for (key, value) in self.session.remembered.borrow().iter() {
            vars.insert(key.clone(), value.clone());
        }
        vars
    }

    /// Render a string against the template variables plus `extras`.
    pub fn render(&self, text: &str, extras: &[(&str, String)]) -> String {
        let mut vars = self.template_vars();
        for (key, value) in extras {
            vars.insert(key.to_string(), value.clone());
        }
        template::render_map(text, &vars)
    }

    // ------------------------------------------------------------------------
    // Flow
    // ------------------------------------------------------------------------

    /// Run another task by spec, on that task's own hosts.
    pub fn execute(&self, spec: &str) -> Result<()> {
        self.session.run_task(spec)
    }

    /// Like [`TaskContext::execute`] with already split arguments.
    pub fn execute_with(&self, name: &str, args: TaskArgs) -> Result<()> {
        self.session.run_invocation(&TaskInvocation {
            name: name.to_string(),
            args,
        })
    }

    pub fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        self.session.console.confirm(message, default)
    }

    pub fn prompt(&self, message: &str, default: &str) -> Result<String> {
        self.session.console.prompt(message, default)
    }

    /// Ask for confirmation; abort with `reason` when refused.
    pub fn confirm_or_abort(&self, message: &str, reason: &str) -> Result<()> {
        if self.confirm(message, false)? {
            Ok(())
        } else {
            Err(self.abort(reason))
        }
    }

    pub fn abort(&self, message: impl Into<String>) -> Error {
        Error::task_aborted(message)
    }

    /// Cached per-host probe result.
    pub(crate) fn probe<F>(&self, key: &str, compute: F) -> Result<Option<String>>
    where
        F: FnOnce() -> Result<Option<String>>,
    {
        let cache_key = (self.target.to_string(), key.to_string());
        if let Some(value) = self.session.probes.borrow().get(&cache_key) {
            return Ok(value.clone());
        }
        let value = compute()?;
        self.session
            .probes
            .borrow_mut()
            .insert(cache_key, value.clone());
        Ok(value)
    }
}

fn login_user(target: &Target) -> String {
    match target {
        Target::Remote { user, .. } => user.clone(),
        Target::Local => std::env::var("USER").unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ScriptedConsole;
    use crate::env::{self, Registry};
    use crate::executor::RecordingRunner;
    use crate::ErrorCode;

    fn site() -> Site {
        let mut site: Site = serde_json::from_value(serde_json::json!({"name": "atlantis"})).unwrap();
        site.path = std::path::PathBuf::from("/nonexistent/invenio-deploy.json");
        site
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        let mut env = env::defaults("loc", "atlantis");
        env.prefix = "/opt/invenio".to_string();
        env.invenio_user = "apache".to_string();
        registry.insert(env, true);
        registry
    }

    fn remote() -> Target {
        Target::from_host_string("web1", "deploy", 22, None)
    }

    #[test]
    fn failed_command_aborts_unless_warn_only() {
        let site = site();
        let registry = registry();
        let runner = RecordingRunner::new();
        runner.reply("false", CommandOutput::failed(1, "nope"));
        let console = ScriptedConsole::new(Vec::<String>::new());
        let session = Session::new(&site, &registry, &runner, &console);
        let ctx = TaskContext::new(&session, registry.active().unwrap(), remote(), "t");

        let err = ctx.run("false").unwrap_err();
        assert_eq!(err.code, ErrorCode::RemoteCommandFailed);
        assert_eq!(err.details["exitCode"], 1);
        assert_eq!(err.details["target"]["host"], "web1");
        assert_eq!(err.details["target"]["environment"], "loc");

        let out = ctx.exec(Cmd::new("false").warn_only()).unwrap();
        assert_eq!(out.exit_code, 1);
        assert_eq!(session.report().len(), 2);
    }

    #[test]
    fn app_user_commands_use_sudo() {
        let site = site();
        let registry = registry();
        let runner = RecordingRunner::new();
        let console = ScriptedConsole::new(Vec::<String>::new());
        let session = Session::new(&site, &registry, &runner, &console);
        let ctx = TaskContext::new(&session, registry.active().unwrap(), remote(), "t");

        ctx.as_app_user("bibsched status").unwrap();
        ctx.local("make").unwrap();

        let executed = runner.executed();
        assert_eq!(executed[0].1, "sudo -u apache -H sh -c 'bibsched status'");
        assert_eq!(executed[1], (Target::Local, "make".to_string()));
    }

    #[test]
    fn append_skips_present_lines() {
        let site = site();
        let registry = registry();
        let runner = RecordingRunner::new();
        runner.reply("-x -F -e 'TraceEnable off'", CommandOutput::ok(""));
        runner.reply("grep", CommandOutput::failed(1, ""));
        let console = ScriptedConsole::new(Vec::<String>::new());
        let session = Session::new(&site, &registry, &runner, &console);
        let ctx = TaskContext::new(&session, registry.active().unwrap(), remote(), "t");

        ctx.append("/etc/httpd.conf", &["TraceEnable off", "SSLProtocol all -SSLv2"], false)
            .unwrap();

        assert!(!runner.ran("echo 'TraceEnable off'"));
        assert!(runner.ran("echo 'SSLProtocol all -SSLv2' >> '/etc/httpd.conf'"));
    }

    #[test]
    fn remembered_values_reach_templates() {
        let site = site();
        let registry = registry();
        let runner = RecordingRunner::new();
        let console = ScriptedConsole::new(Vec::<String>::new());
        let session = Session::new(&site, &registry, &runner, &console);
        let ctx = TaskContext::new(&session, registry.active().unwrap(), remote(), "t");

        session.remember("CFG_DATABASE_PASS", "s3cret");
        assert_eq!(
            ctx.render("{{CFG_DATABASE_PASS}}@{{host}}:{{x}}", &[("x", "1".to_string())]),
            "s3cret@web1:1"
        );
    }

    #[test]
    fn probes_are_cached_per_host() {
        let site = site();
        let registry = registry();
        let runner = RecordingRunner::new();
        let console = ScriptedConsole::new(Vec::<String>::new());
        let session = Session::new(&site, &registry, &runner, &console);
        let ctx = TaskContext::new(&session, registry.active().unwrap(), remote(), "t");

        let mut calls = 0;
        let first = ctx
            .probe("slc", || {
                calls += 1;
                Ok(Some("5".to_string()))
            })
            .unwrap();
        let second = ctx.probe("slc", || Ok(None)).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls, 1);
    }
}
