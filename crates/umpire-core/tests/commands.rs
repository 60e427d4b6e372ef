//! ---
//! umpire_section: "04-configuration-orchestration"
//! umpire_subsection: "tests"
//! umpire_type: "test"
//! umpire_scope: "code"
//! umpire_description: "Administrative commands: staging, validation and diff."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use umpire_config::ConfigError;
use umpire_core::{CliCommands, UmpireDaemon, UmpireEnv, UmpireError};
use umpire_service::testing::{CallJournal, MockService};
use umpire_service::ServiceRegistry;

const CONFIG: &str = r#"{
  "rulesets": [{"bundle_id": "default", "note": "default", "active": true}],
  "services": {"rsync": {"active": true, "port": 8084}},
  "bundles": [{"id": "default", "note": "", "payloads": "payload.json"}]
}"#;

const UPDATED: &str = r#"{
  "rulesets": [
    {"bundle_id": "smt", "note": "smt line", "active": true, "match": {"stage": ["SMT"]}},
    {"bundle_id": "default", "note": "default", "active": true}
  ],
  "services": {"rsync": {"active": true, "port": 8084}},
  "bundles": [
    {"id": "default", "note": "", "payloads": "payload.json"},
    {"id": "smt", "note": "", "payloads": "payload.json"}
  ]
}"#;

struct Fixture {
    dir: TempDir,
    env: Arc<UmpireEnv>,
    commands: CliCommands,
    journal: CallJournal,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let journal = CallJournal::new();
    let mut registry = ServiceRegistry::new();
    registry.register(MockService::new("rsync", journal.clone()));
    let env = Arc::new(UmpireEnv::new(dir.path(), 8080, Arc::new(registry)));
    env.ensure_layout().expect("layout");
    fs::write(env.resources_dir().join("payload.json"), "{}").expect("payloads");
    let commands = CliCommands::new(Arc::new(UmpireDaemon::new(env.clone())));
    Fixture {
        dir,
        env,
        commands,
        journal,
    }
}

fn is_staged_resource(fixture: &Fixture) -> bool {
    let target = fs::canonicalize(fixture.env.staging_config_file()).expect("staging link");
    let resources = fs::canonicalize(fixture.env.resources_dir()).expect("resources");
    target.parent() == Some(resources.as_path())
        && target
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("umpire.") && name.ends_with(".json"))
            .unwrap_or(false)
}

#[test]
fn staging_defaults_to_active_config_and_refuses_double_staging() {
    let fixture = fixture();
    assert_eq!(fixture.commands.get_staging_config().expect("staging"), None);

    let name = fixture
        .commands
        .add_config_from_blob(CONFIG.as_bytes())
        .expect("add");
    let path = fixture.env.get_resource_path(&name).expect("resource");
    fixture.env.activate_config_file(&path).expect("activate");
    assert_eq!(fixture.commands.get_active_config().expect("active"), CONFIG);

    fixture.commands.stage_config_file(None, false).expect("stage");
    assert_eq!(
        fixture.commands.get_staging_config().expect("staging").as_deref(),
        Some(CONFIG)
    );
    assert!(matches!(
        fixture.commands.stage_config_file(Some(&name), false),
        Err(UmpireError::AlreadyStaged)
    ));
}

#[test]
fn forced_staging_of_outside_file_adds_it_as_resource() {
    let fixture = fixture();
    let outside = fixture.dir.path().join("candidate.json");
    fs::write(&outside, UPDATED).expect("write");

    fixture
        .commands
        .stage_config_file(Some(outside.to_str().expect("utf-8 path")), false)
        .expect("stage");
    assert!(is_staged_resource(&fixture));

    fs::write(&outside, CONFIG).expect("rewrite");
    fixture
        .commands
        .stage_config_file(Some(outside.to_str().expect("utf-8 path")), true)
        .expect("forced stage");
    assert!(is_staged_resource(&fixture));
    assert_eq!(
        fixture.commands.get_staging_config().expect("staging").as_deref(),
        Some(CONFIG)
    );
}

#[test]
fn unstage_is_idempotent() {
    let fixture = fixture();
    let name = fixture
        .commands
        .add_config_from_blob(CONFIG.as_bytes())
        .expect("add");
    fixture.commands.stage_config_file(Some(&name), false).expect("stage");
    assert!(fixture.env.has_staging_config_file());

    fixture.commands.unstage_config_file().expect("unstage");
    assert!(!fixture.env.has_staging_config_file());
    assert_eq!(fixture.commands.get_staging_config().expect("staging"), None);
    fixture.commands.unstage_config_file().expect("unstage again");
}

#[test]
fn staging_missing_file_fails() {
    let fixture = fixture();
    assert!(matches!(
        fixture.commands.stage_config_file(Some("/nonexistent/umpire.json"), false),
        Err(UmpireError::Io { .. })
    ));
    assert!(!fixture.env.has_staging_config_file());
}

#[test]
fn validate_config_checks_services_and_resources() {
    let fixture = fixture();
    fixture.commands.validate_config(CONFIG).expect("valid");

    let unknown = CONFIG.replace("\"rsync\"", "\"telnet\"");
    assert!(matches!(
        fixture.commands.validate_config(&unknown),
        Err(UmpireError::Config(ConfigError::UnknownService { name })) if name == "telnet"
    ));

    let bad_property = CONFIG.replace("\"port\"", "\"colour\"");
    assert!(matches!(
        fixture.commands.validate_config(&bad_property),
        Err(UmpireError::Config(ConfigError::Schema { .. }))
    ));

    let missing = CONFIG.replace("payload.json", "gone.json");
    assert!(matches!(
        fixture.commands.validate_config(&missing),
        Err(UmpireError::Config(ConfigError::MissingResources { .. }))
    ));
}

#[test]
fn show_diff_reports_added_rulesets() {
    let fixture = fixture();
    let lines = fixture.commands.show_diff(CONFIG, UPDATED).expect("diff");
    assert_eq!(lines[0], "Newly added rulesets:");
    assert!(lines[1..].iter().all(|line| line.starts_with("  ")));
    assert!(lines.iter().any(|line| line.contains(r#""bundle_id": "smt""#)));
    assert!(!lines.iter().any(|line| line == "Deleted rulesets:"));
    assert!(fixture.commands.show_diff(CONFIG, CONFIG).expect("diff").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn service_commands_drive_the_daemon() {
    let fixture = fixture();
    assert!(matches!(
        fixture.commands.start_services(&["rsync".to_owned()]).await,
        Err(UmpireError::ConfigNotLoaded)
    ));

    let name = fixture
        .commands
        .add_config_from_blob(CONFIG.as_bytes())
        .expect("add");
    let path = fixture.env.get_resource_path(&name).expect("resource");
    fixture.env.load_config(Some(&path), true).expect("load");

    fixture
        .commands
        .start_services(&["rsync".to_owned()])
        .await
        .expect("start");
    fixture
        .commands
        .stop_services(&["rsync".to_owned()])
        .await
        .expect("stop");
    assert_eq!(fixture.journal.started(), vec!["rsync"]);
    assert_eq!(fixture.journal.stopped(), vec!["rsync"]);
    assert!(!fixture.commands.is_deploying());

    fixture.journal.clear();
    fixture.commands.redeploy(false).await.expect("deploy");
    fixture.commands.redeploy(true).await.expect("restart all");
    assert_eq!(fixture.journal.started(), vec!["rsync", "rsync"]);
    assert_eq!(fixture.journal.stopped(), vec!["rsync"]);

    assert!(fixture
        .commands
        .stop_services(&["telnet".to_owned()])
        .await
        .is_err());
}
