//! ---
//! umpire_section: "03-service-orchestration"
//! umpire_subsection: "tests"
//! umpire_type: "test"
//! umpire_scope: "code"
//! umpire_description: "End-to-end test of a command service driving a real process."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
#![cfg(unix)]

use std::time::Duration;

use umpire_common::PortLayout;
use umpire_config::UmpireConfig;
use umpire_service::{
    ServiceContext, ServiceRegistry, SupervisorTiming, UmpireService,
};

fn timing() -> SupervisorTiming {
    SupervisorTiming {
        start_window: Duration::from_millis(150),
        stop_timeout: Duration::from_secs(5),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restarting_an_unchanged_service_is_a_no_op() {
    let dir = tempfile::tempdir().expect("tempdir");
    let context = ServiceContext::from_base_dir(dir.path(), PortLayout::default());
    let registry = ServiceRegistry::builtin(timing());
    let config: UmpireConfig = r#"{
        "rulesets": [],
        "services": {"rsync": {"executable": "/bin/sh", "args": ["-c", "exec sleep 30"]}},
        "bundles": []
    }"#
    .parse()
    .expect("config");

    let service = registry.get_service_instance("rsync").expect("rsync");
    let specs = service.create_processes(&config, &context).expect("specs");
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].cwd, dir.path());

    service.start(specs.clone()).await.expect("first start");
    service.start(specs).await.expect("second start");
    service.stop().await.expect("stop");
    // Stopping again has nothing left to do.
    service.stop().await.expect("second stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_executable_fails_start() {
    let dir = tempfile::tempdir().expect("tempdir");
    let context = ServiceContext::from_base_dir(dir.path(), PortLayout::default());
    let registry = ServiceRegistry::builtin(timing());
    let config: UmpireConfig = r#"{
        "rulesets": [],
        "services": {"dkps": {"executable": "{base_dir}/bin/dkps"}},
        "bundles": []
    }"#
    .parse()
    .expect("config");

    let service = registry.get_service_instance("dkps").expect("dkps");
    let specs = service.create_processes(&config, &context).expect("specs");
    let err = service.start(specs).await.unwrap_err();
    assert!(err.to_string().contains("executable does not exist"));
}
