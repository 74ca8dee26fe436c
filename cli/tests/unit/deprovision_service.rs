//! Removal of the agent from a provisioned host.

use hostforge_cli::application::services::provision::{ProvisionRequest, deprovision, provision};
use hostforge_cli::domain::{Step, StepStatus};

use crate::helpers::{AGENT_BINARY, FakeCa, FakeHost, RecordingReporter, target};

async fn provisioned_root() -> FakeHost {
    let host = FakeHost::fresh_root();
    let target = target(&host);
    provision(
        &host,
        &FakeCa::default(),
        &RecordingReporter::default(),
        &ProvisionRequest {
            host: &target,
            agent_binary: AGENT_BINARY,
            backend_addr: None,
            agent_port: None,
            acme_email: None,
        },
    )
    .await
    .expect("provision");
    host
}

#[tokio::test]
async fn test_deprovision_stops_unit_and_removes_files() {
    let host = provisioned_root().await;
    let reporter = RecordingReporter::default();

    deprovision(&host, &reporter, &target(&host))
        .await
        .expect("deprovision");

    let state = host.state();
    assert!(!state.unit_active);
    assert!(state.files.keys().all(|p| !p.contains(".hostforge")));
    assert!(state.files.keys().all(|p| !p.ends_with("hostforge-agent.service")));
    // Shared infrastructure stays.
    assert!(state.docker);
    assert!(state.networks.contains("hostforge"));
    assert_eq!(state.closes, 2);
    drop(state);

    assert_eq!(
        reporter.completed(),
        vec![
            Step::Connect,
            Step::Identity,
            Step::StopService,
            Step::RemoveUnit,
            Step::RemoveInstall,
        ]
    );
}

#[tokio::test]
async fn test_deprovision_continues_past_failed_steps() {
    let host = provisioned_root().await;
    host.fail_on("disable --now", "Failed to connect to bus");
    let reporter = RecordingReporter::default();

    deprovision(&host, &reporter, &target(&host))
        .await
        .expect("best-effort steps never fail the run");

    assert!(
        reporter
            .steps()
            .iter()
            .any(|(step, status, _)| *step == Step::StopService && *status == StepStatus::Failed)
    );
    assert!(host.file("/root/.hostforge/agent").is_none());
}

#[tokio::test]
async fn test_deprovision_of_clean_host_succeeds() {
    let host = FakeHost::fresh_root();
    deprovision(&host, &RecordingReporter::default(), &target(&host))
        .await
        .expect("nothing to remove is fine");
    // Home and login directory coincide, so there is one location to remove.
    assert!(host.lines().iter().any(|l| l == "rm -rf /root/.hostforge"));
}

#[tokio::test]
async fn test_deprovision_removes_login_directory_fallback() {
    let host = FakeHost::fresh_user(None);
    {
        let mut state = host.state();
        state.home_writable = false;
        state.login_dir = "/var/lib/deploy".to_string();
    }
    provision(
        &host,
        &FakeCa::default(),
        &RecordingReporter::default(),
        &ProvisionRequest {
            host: &target(&host),
            agent_binary: AGENT_BINARY,
            backend_addr: None,
            agent_port: None,
            acme_email: None,
        },
    )
    .await
    .expect("provision into the fallback");
    assert!(host.file("/var/lib/deploy/.hostforge/agent").is_some());

    deprovision(&host, &RecordingReporter::default(), &target(&host))
        .await
        .expect("deprovision");

    assert!(host.ran("rm -rf /home/deploy/.hostforge /var/lib/deploy/.hostforge"));
    assert!(host.file("/var/lib/deploy/.hostforge/agent").is_none());
    assert!(
        host.file("/var/lib/deploy/.config/systemd/user/hostforge-agent.service")
            .is_none()
    );
}
