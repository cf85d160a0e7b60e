use super::*;
use crate::compose::ToolStatus;
use crate::compose::testing::RecordingBackend;
use crate::compose::{LAUNCH_ARGS, TEARDOWN_ARGS};
use crate::layout::ENV_FILE_REL;
use crate::secrets::testing::StaticSecrets;
use crate::secrets::SecretField;
use crate::workspace::Presence;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Cursor;

struct Fixture {
    _dir: tempfile::TempDir,
    layout: WorkspaceLayout,
    compose: RecordingBackend,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp workspace");
        let layout = WorkspaceLayout::new(dir.path().to_path_buf());
        fs::write(layout.join("oss-compose.yaml"), "services: {}\n").expect("write compose");
        fs::write(layout.join("aria-compose.yaml"), "services: {}\n").expect("write compose");
        fs::create_dir_all(layout.join("data/oss-master")).expect("create master dir");
        fs::create_dir_all(layout.join("data/ent-master")).expect("create master dir");
        Self {
            _dir: dir,
            layout,
            compose: RecordingBackend::succeeding(),
        }
    }

    fn with_bundle(self) -> Self {
        let archive = self.layout.join("vRA_SaltStack_Config-8.16.2.tar.gz");
        let file = fs::File::create(archive).expect("create archive");
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, data) in [
            (
                "sse-installer/salt/sse/eapi_service/files/raas-8.16.2-1.el9.x86_64.rpm",
                &b"rpm"[..],
            ),
            (
                "sse-installer/salt/sse/eapi_plugin/files/SSEAPE-8.16.2-py3-none-any.whl",
                &b"whl"[..],
            ),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, data)
                .expect("append member");
        }
        builder
            .into_inner()
            .expect("finish tar")
            .finish()
            .expect("finish gzip");
        self
    }

    fn prepare(
        &self,
        edition: Edition,
        launch: LaunchPolicy,
        secrets: &mut dyn SecretSource,
        answers: &str,
    ) -> (Result<PrepareReport>, String) {
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut output = Vec::new();
        let options = PrepareOptions {
            salt_version: "3006.9".to_string(),
            launch,
        };
        let result = {
            let mut session = Session {
                layout: &self.layout,
                compose: &self.compose,
                secrets,
                input: &mut input,
                output: &mut output,
            };
            prepare(edition, &options, &mut session)
        };
        (result, String::from_utf8(output).expect("utf-8 output"))
    }
}

const QUIET: LaunchPolicy = LaunchPolicy::NonInteractive {
    auto_confirm: false,
};

#[test]
fn oss_prepare_writes_version_and_links() {
    let fixture = Fixture::new();
    let (result, output) = fixture.prepare(
        Edition::OpenSource,
        QUIET,
        &mut StaticSecrets::default(),
        "",
    );
    let report = result.expect("prepare");

    let env = fs::read_to_string(fixture.layout.join(ENV_FILE_REL)).expect("read .env");
    assert_eq!(env, "SALT_VERSION=3006.9\n");
    assert_eq!(
        fs::read_link(fixture.layout.compose_link_path()).expect("compose link"),
        fixture.layout.join("oss-compose.yaml")
    );
    assert_eq!(
        fs::read_link(fixture.layout.join("data/master.d")).expect("data link"),
        fixture.layout.join("data/oss-master")
    );
    assert!(report.bundle.is_none());
    assert_eq!(report.launch, LaunchOutcome::Skipped);
    assert!(output.contains("SALT_VERSION=3006.9"), "{output}");

    let state = workspace::scan(&fixture.layout).expect("scan");
    assert_eq!(state.dangling_links().count(), 0);
}

#[test]
fn enterprise_prepare_without_bundle_writes_nothing() {
    let fixture = Fixture::new();
    let mut secrets = StaticSecrets::complete();

    let (result, _output) = fixture.prepare(Edition::Enterprise, QUIET, &mut secrets, "");

    let err = result.expect_err("missing bundle must fail");
    assert!(format!("{err:#}").contains("installer bundle not found"), "{err:#}");
    assert!(!fixture.layout.env_file_path().exists());
    assert_eq!(secrets.requests, 0);
    assert!(fs::symlink_metadata(fixture.layout.compose_link_path()).is_err());
}

#[test]
fn enterprise_prepare_records_packages_and_masks_credentials() {
    let fixture = Fixture::new().with_bundle();

    let (result, output) = fixture.prepare(
        Edition::Enterprise,
        QUIET,
        &mut StaticSecrets::complete(),
        "",
    );
    let report = result.expect("prepare");

    let env = crate::envfile::load(&fixture.layout.env_file_path()).expect("load .env");
    assert_eq!(env.get("SALT_VERSION"), Some("3006.9"));
    assert_eq!(env.get("RAAS_RPM_NAME"), Some("raas-8.16.2-1.el9.x86_64.rpm"));
    assert_eq!(
        env.get("MASTER_PLUGIN_NAME"),
        Some("SSEAPE-8.16.2-py3-none-any.whl")
    );
    assert_eq!(env.get("POSTGRES_USER"), Some("salteapi"));
    assert_eq!(env.get("POSTGRES_PASS"), Some("pg-secret"));
    assert_eq!(
        fs::read_link(fixture.layout.compose_link_path()).expect("compose link"),
        fixture.layout.join("aria-compose.yaml")
    );
    assert!(report.bundle.is_some());
    assert!(!output.contains("pg-secret"), "{output}");
    assert!(output.contains("POSTGRES_PASS=********"), "{output}");
}

#[test]
fn enterprise_prepare_without_credentials_fails_before_writing() {
    let fixture = Fixture::new().with_bundle();
    let mut secrets = StaticSecrets::default().with(SecretField::PostgresPassword, "pg");

    let (result, _output) = fixture.prepare(Edition::Enterprise, QUIET, &mut secrets, "");

    assert!(result.is_err());
    assert!(!fixture.layout.env_file_path().exists());
}

#[test]
fn auto_confirm_launches_exactly_once() {
    let fixture = Fixture::new();
    let (result, _output) = fixture.prepare(
        Edition::OpenSource,
        LaunchPolicy::NonInteractive { auto_confirm: true },
        &mut StaticSecrets::default(),
        "",
    );

    assert_eq!(result.expect("prepare").launch, LaunchOutcome::Succeeded);
    assert_eq!(fixture.compose.count(&LAUNCH_ARGS), 1);
}

#[test]
fn without_auto_confirm_nothing_launches() {
    let fixture = Fixture::new();
    let (result, output) = fixture.prepare(
        Edition::OpenSource,
        QUIET,
        &mut StaticSecrets::default(),
        "y\n",
    );

    result.expect("prepare");
    assert_eq!(fixture.compose.count(&LAUNCH_ARGS), 0);
    assert!(!output.contains("Do you wish"), "{output}");
}

#[test]
fn interactive_prompt_answer_controls_launch() {
    let fixture = Fixture::new();
    let (result, output) = fixture.prepare(
        Edition::OpenSource,
        LaunchPolicy::Interactive,
        &mut StaticSecrets::default(),
        "perhaps\nyes\n",
    );

    result.expect("prepare");
    assert_eq!(output.matches("Do you wish").count(), 2);
    assert_eq!(fixture.compose.count(&LAUNCH_ARGS), 1);
}

#[test]
fn rerun_tears_down_and_relinks() {
    let fixture = Fixture::new();
    let mut secrets = StaticSecrets::default();
    fixture
        .prepare(Edition::OpenSource, QUIET, &mut secrets, "")
        .0
        .expect("first prepare");

    let (result, _output) = fixture.prepare(Edition::OpenSource, QUIET, &mut secrets, "");
    let report = result.expect("second prepare");

    assert_eq!(report.clean.teardown, TeardownOutcome::Succeeded);
    assert_eq!(fixture.compose.count(&TEARDOWN_ARGS), 1);
    assert!(report
        .links
        .iter()
        .all(|(_, outcome)| matches!(outcome, LinkOutcome::Created { .. })));
}

#[test]
fn switching_editions_cleans_the_old_links() {
    let fixture = Fixture::new().with_bundle();
    fixture
        .prepare(Edition::OpenSource, QUIET, &mut StaticSecrets::default(), "")
        .0
        .expect("oss prepare");

    fixture
        .prepare(Edition::Enterprise, QUIET, &mut StaticSecrets::complete(), "")
        .0
        .expect("enterprise prepare");

    assert_eq!(
        fs::read_link(fixture.layout.join("data/master.d")).expect("data link"),
        fixture.layout.join("data/ent-master")
    );
}

#[test]
fn clean_mode_reports_drift_and_succeeds() {
    let fixture = Fixture::new();
    fs::create_dir_all(fixture.layout.join("data/master.d")).expect("create drift");
    let mut output = Vec::new();

    let report = run_clean(&fixture.layout, &fixture.compose, &mut output).expect("clean");

    assert!(!report.has_failures());
    let text = String::from_utf8(output).expect("utf-8");
    assert!(text.contains("left data/master.d in place"), "{text}");
}

#[test]
fn clean_mode_reports_failed_teardown() {
    let mut fixture = Fixture::new();
    fixture
        .prepare(Edition::OpenSource, QUIET, &mut StaticSecrets::default(), "")
        .0
        .expect("prepare");
    fixture.compose = RecordingBackend::new(ToolStatus::Exited(Some(2)));
    let mut output = Vec::new();

    let report = run_clean(&fixture.layout, &fixture.compose, &mut output).expect("clean");

    assert!(matches!(report.teardown, TeardownOutcome::Failed { .. }));
    let text = String::from_utf8(output).expect("utf-8");
    assert!(text.starts_with("compose teardown failed"), "{text}");
    assert!(fs::symlink_metadata(fixture.layout.compose_link_path()).is_err());
}

#[test]
fn status_mode_reports_links_as_json() {
    let fixture = Fixture::new();
    fixture
        .prepare(Edition::OpenSource, QUIET, &mut StaticSecrets::default(), "")
        .0
        .expect("prepare");
    let mut output = Vec::new();

    let state = run_status(&fixture.layout, true, &mut output).expect("status");

    assert!(matches!(
        state
            .paths
            .iter()
            .find(|entry| entry.path == crate::layout::COMPOSE_LINK.rel)
            .map(|entry| &entry.found),
        Some(Presence::Symlink { resolves: true, .. })
    ));
    let value: serde_json::Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(value["paths"].as_array().map(Vec::len), Some(13));
}
