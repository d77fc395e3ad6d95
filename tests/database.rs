mod common;

use common::{local_site, position, Fixture};
use invenio_deploy::tasks::mysql::PASSWORD_PROMPT;
use invenio_deploy::{CommandOutput, ErrorCode, NoConsole, RecordingRunner, ScriptedConsole, Session};
use serde_json::json;

#[test]
fn createdb_prompts_once_and_remembers_password() {
    let fixture = Fixture::new(local_site(json!({"database": {"password": null}})))
        .template("invenio-local.conf", "CFG_DATABASE_PASS = {{CFG_DATABASE_PASS}}\n");
    let registry = fixture.registry("loc");
    let runner = RecordingRunner::new();
    let console = ScriptedConsole::new(["s3cret"]);
    let session = Session::new(&fixture.site, &registry, &runner, &console);

    session.run_task("mysql_createdb").unwrap();
    session.run_task("mysql_createdb").unwrap();
    session.run_task("invenio_conf").unwrap();

    assert_eq!(console.asked(), vec![PASSWORD_PROMPT.to_string()]);
    assert!(runner.ran("GRANT ALL PRIVILEGES ON atlantis.* TO atlantis@localhost IDENTIFIED BY 's3cret'"));
    let conf = runner.stdin_for("invenio-local.conf").unwrap();
    assert_eq!(String::from_utf8(conf).unwrap(), "CFG_DATABASE_PASS = s3cret\n");
}

#[test]
fn createdb_report_masks_passwords() {
    let fixture = Fixture::new(local_site(json!({"database": {"password": "s3cret"}})));
    let registry = fixture.registry("loc");
    let runner = RecordingRunner::new();
    let session = Session::new(&fixture.site, &registry, &runner, &NoConsole);

    session.run_task("mysql_createdb").unwrap();

    let shown: Vec<String> = session.report().into_iter().map(|r| r.command).collect();
    assert_eq!(shown.len(), 3);
    assert!(shown.iter().all(|line| !line.contains("rootpw") && !line.contains("s3cret")));
    assert!(shown[0].starts_with("mysql -u root -p**** -e"));
    assert!(shown[1].contains("IDENTIFIED BY '****'"));
    assert!(runner.ran("-prootpw"));
    assert!(runner.ran("IDENTIFIED BY 's3cret'"));
}

#[test]
fn createdb_uses_default_password_on_empty_answer() {
    let fixture = Fixture::new(local_site(json!({"database": {"password": null}})));
    let registry = fixture.registry("loc");
    let runner = RecordingRunner::new();
    let console = ScriptedConsole::new([""]);
    let session = Session::new(&fixture.site, &registry, &runner, &console);

    session.run_task("mysql_createdb").unwrap();

    assert!(runner.ran("IDENTIFIED BY 'my123p\\$ss'"));
}

#[test]
fn dropdb_is_refused_unless_allowed() {
    let fixture = Fixture::new(local_site(json!({})));
    let registry = fixture.registry("loc");
    let runner = RecordingRunner::new();
    let session = Session::new(&fixture.site, &registry, &runner, &NoConsole);

    let err = session.run_task("mysql_dropdb").unwrap_err();

    assert_eq!(err.code, ErrorCode::TaskAborted);
    assert!(err.message.contains("atlantis"));
    assert!(!err.hints.is_empty());
    assert!(runner.lines().is_empty());
}

#[test]
fn dropdb_revokes_and_flushes_when_allowed() {
    let fixture = Fixture::new(local_site(json!({"database": {"drop_allowed": true}})));
    let registry = fixture.registry("loc");
    let runner = RecordingRunner::new();
    let session = Session::new(&fixture.site, &registry, &runner, &NoConsole);

    session.run_task("mysql_dropdb").unwrap();

    let lines = runner.lines();
    assert!(position(&lines, "DROP DATABASE IF EXISTS atlantis") < position(&lines, "REVOKE ALL PRIVILEGES"));
    assert!(lines.last().unwrap().contains("mysqladmin -u root -prootpw flush-privileges"));
}

#[test]
fn load_without_dump_file_aborts() {
    let fixture = Fixture::new(local_site(json!({})));
    let registry = fixture.registry("loc");
    let runner = RecordingRunner::new();
    runner.reply("test -e", CommandOutput::failed(1, ""));
    let session = Session::new(&fixture.site, &registry, &runner, &NoConsole);

    let err = session.run_task("mysql_load").unwrap_err();

    assert_eq!(err.code, ErrorCode::TaskAborted);
    assert_eq!(err.message, "File /opt/atlantis/atlantis.sql.gz does not exists.");
}

#[test]
fn load_declined_leaves_database_alone() {
    let fixture = Fixture::new(local_site(json!({})));
    let registry = fixture.registry("loc");
    let runner = RecordingRunner::new();
    let console = ScriptedConsole::new(["n"]);
    let session = Session::new(&fixture.site, &registry, &runner, &console);

    session.run_task("mysql_load:/backups/atlantis.sql").unwrap();

    assert!(!runner.ran("DROP DATABASE"));
    assert!(console.asked()[0].ends_with("load /backups/atlantis.sql?"));
}

#[test]
fn load_recreates_database_and_streams_dump() {
    let fixture = Fixture::new(local_site(json!({})));
    let registry = fixture.registry("loc");
    let runner = RecordingRunner::new();
    let console = ScriptedConsole::new(["y"]);
    let session = Session::new(&fixture.site, &registry, &runner, &console);

    session.run_task("mysql_load").unwrap();

    let lines = runner.lines();
    assert!(position(&lines, "DROP DATABASE IF EXISTS atlantis") < position(&lines, "CREATE DATABASE"));
    assert!(lines
        .last()
        .unwrap()
        .contains("gunzip -c /opt/atlantis/atlantis.sql.gz | mysql -u root -f -prootpw atlantis"));
}
