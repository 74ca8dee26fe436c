//! End-to-end provisioning runs against the simulated host.

use hostforge_cli::application::services::binary::DeployOutcome;
use hostforge_cli::application::services::certs::CertsOutcome;
use hostforge_cli::application::services::network::NetworkOutcome;
use hostforge_cli::application::services::provision::{ProvisionRequest, provision};
use hostforge_cli::application::services::proxy::ProxyOutcome;
use hostforge_cli::application::services::service_unit::ServiceOutcome;
use hostforge_cli::domain::proxy::{NETWORK_NAME, PROXY_CONFIG_PATH, PROXY_IMAGE};
use hostforge_cli::domain::{ProvisionError, Step, StepStatus, TargetHost};

use crate::helpers::{
    AGENT_BINARY, CA_PEM, FakeCa, FakeHost, KEY_PEM, RecordingReporter, SftpMode, target,
};

const EMAIL: &str = "ops@example.com";

fn request<'a>(host: &'a TargetHost, email: Option<&'a str>) -> ProvisionRequest<'a> {
    ProvisionRequest {
        host,
        agent_binary: AGENT_BINARY,
        backend_addr: Some("cp.example.com:50051"),
        agent_port: None,
        acme_email: email,
    }
}

#[tokio::test]
async fn test_fresh_root_host_is_fully_provisioned() {
    let host = FakeHost::fresh_root();
    let ca = FakeCa::default();
    let reporter = RecordingReporter::default();
    let target = target(&host);

    let report = provision(&host, &ca, &reporter, &request(&target, Some(EMAIL)))
        .await
        .expect("provision");

    assert_eq!(report.network, NetworkOutcome::Created);
    assert_eq!(report.proxy, Some(ProxyOutcome::Installed));
    assert_eq!(report.binary, DeployOutcome::Updated);
    assert_eq!(report.service, ServiceOutcome::Restarted);
    assert_eq!(report.paths.install_dir, "/root/.hostforge");

    let state = host.state();
    assert!(state.docker && state.daemon && state.compose && state.buildx);
    assert!(state.networks.contains(NETWORK_NAME));
    assert_eq!(state.proxy_image.as_deref(), Some(PROXY_IMAGE));
    assert!(state.unit_active);
    assert_eq!(state.closes, 1);
    drop(state);

    let config = host.file_text(PROXY_CONFIG_PATH).expect("proxy config written");
    assert!(config.contains(EMAIL));
    assert_eq!(host.mode("/etc/traefik/acme/acme.json").as_deref(), Some("600"));

    assert_eq!(host.file("/root/.hostforge/agent").as_deref(), Some(AGENT_BINARY));
    assert_eq!(host.mode("/root/.hostforge/agent").as_deref(), Some("755"));
    assert_eq!(host.file_text("/root/.hostforge/ca.pem").as_deref(), Some(CA_PEM));
    assert_eq!(host.file_text("/root/.hostforge/key.pem").as_deref(), Some(KEY_PEM));
    assert_eq!(host.mode("/root/.hostforge/key.pem").as_deref(), Some("600"));
    assert_eq!(host.mode("/root/.hostforge/cert.pem").as_deref(), Some("644"));

    let unit = host
        .file_text("/root/.config/systemd/user/hostforge-agent.service")
        .expect("unit written");
    assert!(unit.contains("--backend cp.example.com:50051"));
    assert!(unit.contains("--server-id srv-1"));
    assert!(unit.contains("--port 50052"));

    assert_eq!(
        ca.issued.lock().expect("lock").as_slice(),
        &[("srv-1".to_string(), "10.0.0.5".to_string())]
    );
}

#[tokio::test]
async fn test_steps_report_running_then_ok_in_pipeline_order() {
    let host = FakeHost::fresh_root();
    let reporter = RecordingReporter::default();
    let target = target(&host);

    provision(&host, &FakeCa::default(), &reporter, &request(&target, Some(EMAIL)))
        .await
        .expect("provision");

    assert_eq!(
        reporter.completed(),
        vec![
            Step::Connect,
            Step::Identity,
            Step::Runtime,
            Step::Network,
            Step::Proxy,
            Step::FileTransfer,
            Step::Paths,
            Step::Certificates,
            Step::Binary,
            Step::Service,
        ]
    );
    let steps = reporter.steps();
    for pair in steps.windows(2) {
        if pair[1].1 == StepStatus::Ok {
            assert_eq!(pair[0].0, pair[1].0, "ok must follow its own running event");
            assert_eq!(pair[0].1, StepStatus::Running);
        }
    }
}

#[tokio::test]
async fn test_second_run_converges_without_reinstalling() {
    let host = FakeHost::fresh_root();
    let target = target(&host);
    let ca = FakeCa::default();
    provision(&host, &ca, &RecordingReporter::default(), &request(&target, Some(EMAIL)))
        .await
        .expect("first run");
    host.clear_received();

    let report = provision(&host, &ca, &RecordingReporter::default(), &request(&target, Some(EMAIL)))
        .await
        .expect("second run");

    assert_eq!(report.network, NetworkOutcome::AlreadyPresent);
    assert_eq!(report.proxy, Some(ProxyOutcome::UpToDate));
    assert_eq!(report.binary, DeployOutcome::Unchanged);
    assert_eq!(report.service, ServiceOutcome::AlreadyRunning);

    assert!(!host.ran("get.docker.com"));
    assert!(!host.ran("docker network create"));
    assert!(!host.ran("docker run"));
    assert!(!host.ran("docker pull"));
    assert!(!host.ran("restart"));
    assert_eq!(host.state().restarts, 1);
    // Certificates are re-issued on every run.
    assert_eq!(ca.issued.lock().expect("lock").len(), 2);
}

#[tokio::test]
async fn test_new_binary_triggers_restart() {
    let host = FakeHost::fresh_root();
    let target = target(&host);
    provision(&host, &FakeCa::default(), &RecordingReporter::default(), &request(&target, None))
        .await
        .expect("first run");

    let mut next = request(&target, None);
    next.agent_binary = b"\x7fELF fake agent build 2";
    let report = provision(&host, &FakeCa::default(), &RecordingReporter::default(), &next)
        .await
        .expect("second run");

    assert_eq!(report.binary, DeployOutcome::Updated);
    assert_eq!(report.service, ServiceOutcome::Restarted);
    assert_eq!(host.state().restarts, 2);
    assert!(host.file("/root/.hostforge/agent.new").is_none(), "staged file renamed away");
}

#[tokio::test]
async fn test_rotated_certificates_trigger_restart() {
    let host = FakeHost::fresh_root();
    let target = target(&host);
    let ca = FakeCa::rotating();
    provision(&host, &ca, &RecordingReporter::default(), &request(&target, None))
        .await
        .expect("first run");

    let report = provision(&host, &ca, &RecordingReporter::default(), &request(&target, None))
        .await
        .expect("second run");

    assert_eq!(report.binary, DeployOutcome::Unchanged);
    assert_eq!(report.certs, CertsOutcome::Updated);
    assert_eq!(report.service, ServiceOutcome::Restarted);
    assert_eq!(host.state().restarts, 2);
    assert_eq!(
        host.file_text("/root/.hostforge/cert.pem").as_deref(),
        Some("-----BEGIN CERTIFICATE-----\nAGENT 2\n-----END CERTIFICATE-----\n")
    );
}

#[tokio::test]
async fn test_identical_certificates_are_not_rewritten() {
    let host = FakeHost::fresh_root();
    let target = target(&host);
    provision(&host, &FakeCa::default(), &RecordingReporter::default(), &request(&target, None))
        .await
        .expect("first run");
    host.clear_received();

    let report = provision(&host, &FakeCa::default(), &RecordingReporter::default(), &request(&target, None))
        .await
        .expect("second run");

    assert_eq!(report.certs, CertsOutcome::Unchanged);
    assert!(host.ran("sha256sum /root/.hostforge/key.pem"));
    assert!(!host.ran("cat > /root/.hostforge/key.pem"));
}

#[tokio::test]
async fn test_root_pipeline_never_elevates() {
    let host = FakeHost::fresh_root();
    let target = target(&host);

    provision(&host, &FakeCa::default(), &RecordingReporter::default(), &request(&target, Some(EMAIL)))
        .await
        .expect("provision");

    let received = host.received();
    assert!(!received.is_empty());
    for r in &received {
        assert!(!r.elevated, "root command was elevated: {}", r.raw);
        assert!(!r.raw.starts_with("sudo"), "root command was elevated: {}", r.raw);
        assert!(!r.raw.contains("sudo -"), "root command was elevated: {}", r.raw);
    }
}

#[tokio::test]
async fn test_unit_breaking_host_id_is_rejected_before_connecting() {
    let host = FakeHost::fresh_root();
    let mut target = target(&host);
    target.host_id = "srv-1\nExecStartPre=/bin/touch /tmp/owned".to_string();

    let err = provision(&host, &FakeCa::default(), &RecordingReporter::default(), &request(&target, None))
        .await
        .expect_err("must reject");

    assert!(matches!(
        err.downcast_ref::<ProvisionError>(),
        Some(ProvisionError::UnsafeValue { field: "host id", .. })
    ));
    assert_eq!(host.state().connects, 0);
}

#[tokio::test]
async fn test_invalid_email_is_rejected_before_connecting() {
    let host = FakeHost::fresh_root();
    let target = target(&host);

    let err = provision(
        &host,
        &FakeCa::default(),
        &RecordingReporter::default(),
        &request(&target, Some("not-an-email")),
    )
    .await
    .expect_err("must reject");

    assert!(matches!(
        err.downcast_ref::<ProvisionError>(),
        Some(ProvisionError::InvalidEmail(_))
    ));
    assert_eq!(host.state().connects, 0);
    assert!(host.received().is_empty());
}

#[tokio::test]
async fn test_proxy_is_skipped_without_email() {
    let host = FakeHost::fresh_root();
    let reporter = RecordingReporter::default();
    let target = target(&host);

    let report = provision(&host, &FakeCa::default(), &reporter, &request(&target, None))
        .await
        .expect("provision");

    assert_eq!(report.proxy, None);
    assert!(!host.ran("docker run"));
    assert!(host.file(PROXY_CONFIG_PATH).is_none());
    assert!(
        reporter
            .steps()
            .iter()
            .any(|(step, status, msg)| *step == Step::Proxy
                && *status == StepStatus::Ok
                && msg.contains("skipped"))
    );
}

#[tokio::test]
async fn test_proxy_image_drift_is_reinstalled() {
    let host = FakeHost::fresh_root();
    {
        let mut state = host.state();
        state.docker = true;
        state.daemon = true;
        state.compose = true;
        state.buildx = true;
        state.proxy_image = Some("traefik:v2.11".to_string());
    }
    let target = target(&host);

    let report = provision(&host, &FakeCa::default(), &RecordingReporter::default(), &request(&target, Some(EMAIL)))
        .await
        .expect("provision");

    assert_eq!(report.proxy, Some(ProxyOutcome::Installed));
    assert!(host.ran("docker rm -f traefik"));
    assert!(host.ran(&format!("docker pull {PROXY_IMAGE}")));
    assert_eq!(host.state().proxy_image.as_deref(), Some(PROXY_IMAGE));
}

#[tokio::test]
async fn test_failed_pull_still_runs_container() {
    let host = FakeHost::fresh_root();
    host.fail_on("docker pull", "Error response from daemon: registry unreachable");
    let target = target(&host);

    let report = provision(&host, &FakeCa::default(), &RecordingReporter::default(), &request(&target, Some(EMAIL)))
        .await
        .expect("pull failure is not fatal");

    assert_eq!(report.proxy, Some(ProxyOutcome::Installed));
    assert_eq!(host.state().proxy_image.as_deref(), Some(PROXY_IMAGE));
}

#[tokio::test]
async fn test_network_create_race_counts_as_present() {
    let host = FakeHost::fresh_root();
    host.state().network_create_race =
        Some("Error response from daemon: network with name hostforge already exists".to_string());
    let target = target(&host);

    let report = provision(&host, &FakeCa::default(), &RecordingReporter::default(), &request(&target, None))
        .await
        .expect("race is success");

    assert_eq!(report.network, NetworkOutcome::AlreadyPresent);
}

#[tokio::test]
async fn test_network_create_failure_is_fatal() {
    let host = FakeHost::fresh_root();
    host.fail_on("docker network create", "Error response from daemon: pool overlaps");
    let reporter = RecordingReporter::default();
    let target = target(&host);

    let err = provision(&host, &FakeCa::default(), &reporter, &request(&target, None))
        .await
        .expect_err("must fail");

    assert!(format!("{err:#}").contains("pool overlaps"));
    assert_eq!(reporter.failed(), vec![Step::Network]);
    assert!(!reporter.completed().contains(&Step::Service));
    assert_eq!(host.state().closes, 1, "session closed on failure");
}

#[tokio::test]
async fn test_missing_buildx_degrades_with_warning() {
    let host = FakeHost::fresh_root();
    {
        let mut state = host.state();
        state.docker = true;
        state.daemon = true;
        state.compose = true;
        state.packages_installable = false;
    }
    let reporter = RecordingReporter::default();
    let target = target(&host);

    provision(&host, &FakeCa::default(), &reporter, &request(&target, None))
        .await
        .expect("buildx is optional");

    assert!(reporter.logs().iter().any(|l| l.starts_with("warning:") && l.contains("buildx")));
}

#[tokio::test]
async fn test_missing_compose_that_cannot_be_installed_is_fatal() {
    let host = FakeHost::fresh_root();
    {
        let mut state = host.state();
        state.docker = true;
        state.daemon = true;
        state.packages_installable = false;
    }
    let target = target(&host);

    let err = provision(&host, &FakeCa::default(), &RecordingReporter::default(), &request(&target, None))
        .await
        .expect_err("compose is required");

    assert!(format!("{err:#}").contains("compose"));
}

#[tokio::test]
async fn test_plugins_are_installed_in_one_transaction() {
    let host = FakeHost::fresh_root();
    let target = target(&host);

    provision(&host, &FakeCa::default(), &RecordingReporter::default(), &request(&target, None))
        .await
        .expect("provision");

    let installs: Vec<String> = host
        .lines()
        .into_iter()
        .filter(|l| l.contains("apt-get install"))
        .collect();
    assert_eq!(installs.len(), 1);
    assert!(installs[0].contains("docker-compose-plugin docker-buildx-plugin"));
}

#[tokio::test]
async fn test_sftp_unavailable_falls_back_to_shell_stream() {
    let host = FakeHost::fresh_root();
    host.state().sftp = SftpMode::Unavailable;
    let reporter = RecordingReporter::default();
    let target = target(&host);

    let report = provision(&host, &FakeCa::default(), &reporter, &request(&target, None))
        .await
        .expect("provision");

    assert_eq!(report.binary, DeployOutcome::Updated);
    assert_eq!(host.file("/root/.hostforge/agent").as_deref(), Some(AGENT_BINARY));
    assert!(host.ran("cat > /root/.hostforge/agent.new"));
    assert!(reporter.completed().contains(&Step::FileTransfer));
}

#[tokio::test]
async fn test_both_upload_paths_failing_reports_both_causes() {
    let host = FakeHost::fresh_root();
    host.state().sftp = SftpMode::Failing;
    host.fail_on("cat > /root/.hostforge/agent.new", "No space left on device");
    let reporter = RecordingReporter::default();
    let target = target(&host);

    let err = provision(&host, &FakeCa::default(), &reporter, &request(&target, None))
        .await
        .expect_err("must fail");

    match err.downcast_ref::<ProvisionError>() {
        Some(ProvisionError::Transfer { primary, fallback }) => {
            assert!(primary.contains("permission denied"));
            assert!(fallback.contains("No space left on device"));
        }
        other => panic!("expected transfer error, got {other:?}"),
    }
    assert_eq!(reporter.failed(), vec![Step::Binary]);
    assert_eq!(host.state().closes, 1);
}

#[tokio::test]
async fn test_unwritable_home_falls_back_to_login_directory() {
    let host = FakeHost::fresh_user(None);
    {
        let mut state = host.state();
        state.home_writable = false;
        state.login_dir = "/var/lib/deploy".to_string();
    }
    let reporter = RecordingReporter::default();
    let target = target(&host);

    let report = provision(&host, &FakeCa::default(), &reporter, &request(&target, None))
        .await
        .expect("provision");

    assert_eq!(report.paths.install_dir, "/var/lib/deploy/.hostforge");
    assert!(host.file("/var/lib/deploy/.hostforge/agent").is_some());
    let unit = host
        .file_text("/var/lib/deploy/.config/systemd/user/hostforge-agent.service")
        .expect("unit next to the fallback base");
    assert!(unit.contains("/var/lib/deploy/.hostforge/agent"));
    assert!(reporter.logs().iter().any(|l| l.contains("falling back")));
}

#[tokio::test]
async fn test_connection_failure_is_reported_on_connect_step() {
    let host = FakeHost::fresh_root();
    host.fail_on("<connect>", "");
    let reporter = RecordingReporter::default();
    let target = target(&host);

    let err = provision(&host, &FakeCa::default(), &reporter, &request(&target, None))
        .await
        .expect_err("must fail");

    assert!(matches!(
        err.downcast_ref::<ProvisionError>(),
        Some(ProvisionError::Connection { .. })
    ));
    assert_eq!(reporter.failed(), vec![Step::Connect]);
    assert_eq!(host.state().closes, 0);
}
