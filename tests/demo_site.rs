use std::path::PathBuf;

use invenio_deploy::env::{EnvParams, Registry};
use invenio_deploy::utils::args::split_spec;
use invenio_deploy::{NoConsole, RecordingRunner, Role, Session, Site};

fn demo_site() -> Site {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/atlantis/invenio-deploy.json");
    Site::load(&path).unwrap()
}

#[test]
fn demo_environments_load() {
    let site = demo_site();
    let registry = Registry::from_site(&site, "prod", &EnvParams::default()).unwrap();

    assert_eq!(registry.names(), vec!["loc".to_string(), "prod".to_string()]);
    assert_eq!(registry.active_name(), Some("prod"));

    let prod = registry.active().unwrap();
    assert_eq!(prod.instance, "atlantisprod");
    assert_eq!(prod.hosts(Role::Web).len(), 2);
    assert_eq!(prod.repo_names(), vec!["invenio", "atlantis-overlay"]);
    assert!(!prod.tasks.contains_key("clean"));
    assert!(prod.tasks.contains_key("prepare"));
    assert_eq!(prod.vars["CFG_MISCUTIL_SMTP_PORT"], "25");

    let loc = registry.get("loc").unwrap();
    assert!(loc.database.drop_allowed);
    assert_eq!(loc.instance, "atlantis");
}

#[test]
fn ref_parameters_pick_up_site_overrides() {
    let site = demo_site();
    let (_, args) = split_spec("loc:py=2.6,ref=origin/next");
    let params = EnvParams::from_spec_args(&args).unwrap();
    let registry = Registry::from_site(&site, "loc", &params).unwrap();

    let loc = registry.active().unwrap();
    assert_eq!(loc.instance, "atlantis26next");
    assert_eq!(loc.python, "/usr/bin/python2.6");
    let invenio = loc.repo("invenio").unwrap();
    assert_eq!(invenio.git_ref.as_deref(), Some("origin/next"));
    assert_eq!(invenio.requirements.len(), 3);
}

#[test]
fn prod_deploy_drains_and_restores_the_balancer() {
    let site = demo_site();
    let registry = Registry::from_site(&site, "prod", &EnvParams::default()).unwrap();
    let runner = RecordingRunner::dry_run();
    let session = Session::new(&site, &registry, &runner, &NoConsole);

    session.run_group("deploy").unwrap();

    let executed = runner.executed();
    let (first_host, first_line) = &executed[0];
    assert_eq!(first_host.host(), "lb1.example.org");
    assert!(first_line.contains("disable server invenio/web1"));

    let (last_host, last_line) = executed.last().unwrap();
    assert_eq!(last_host.host(), "lb1.example.org");
    assert!(last_line.contains("enable server invenio/web1"));

    let upgrades = executed
        .iter()
        .filter(|(_, line)| line.contains("inveniocfg --upgrade"))
        .count();
    assert_eq!(upgrades, 2);
    assert!(runner.ran("sudo -u apache -H sh -c 'cd /opt/invenio/src/invenio; git checkout -f origin/maint-1.1'"));
    assert!(runner.ran("cd /opt/invenio/src/invenio && ./configure --prefix=/opt/invenio"));
    assert!(!runner.ran("cd /opt/invenio/src/atlantis-overlay && ./configure"));

    let conf = String::from_utf8(runner.stdin_for("invenio-local.conf").unwrap()).unwrap();
    assert!(conf.contains("CFG_DEVEL_SITE = 0"));
    assert!(conf.contains("CFG_SITE_URL = http://atlantis.example.org:80"));
    assert!(conf.contains("CFG_MISCUTIL_SMTP_HOST = smtp.example.org"));
}

#[test]
fn demo_lists_script_tasks_first() {
    let site = demo_site();
    let registry = Registry::from_site(&site, "loc", &EnvParams::default()).unwrap();
    let runner = RecordingRunner::dry_run();
    let session = Session::new(&site, &registry, &runner, &NoConsole);

    let tasks = session.task_list().unwrap();
    assert_eq!(tasks[0].name, "inspire_dbchanges");
    assert_eq!(tasks[0].kind, "script");
    assert!(tasks.iter().any(|t| t.name == "restart" && t.kind == "group"));
    assert!(tasks.iter().any(|t| t.name == "bootstrap" && t.kind == "builtin"));
}
