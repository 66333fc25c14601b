use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tempfile::tempdir;

use integration_apply::apply::apply;
use integration_apply::config::{ApplyConfig, FileSplitter, PipelineRun};
use integration_apply::contract::{
    Clients, MockAuthConfigApi, MockConnectionApi, MockCustomConnectorApi, MockEndpointApi,
    MockIntegrationApi, MockManagedZoneApi, MockResultSink, MockSfdcApi,
};
use integration_apply::error::ApplyError;
use integration_apply::reconcile::{StageReport, StageStatus};

/// One mock per capability. Mocks without expectations panic when called.
#[derive(Default)]
struct Mocks {
    auth_configs: MockAuthConfigApi,
    endpoints: MockEndpointApi,
    zones: MockManagedZoneApi,
    connections: MockConnectionApi,
    custom_connectors: MockCustomConnectorApi,
    sfdc: MockSfdcApi,
    integrations: MockIntegrationApi,
    results: MockResultSink,
}

impl Mocks {
    fn clients(&self) -> Clients<'_> {
        Clients {
            auth_configs: &self.auth_configs,
            endpoints: &self.endpoints,
            zones: &self.zones,
            connections: &self.connections,
            custom_connectors: &self.custom_connectors,
            sfdc: &self.sfdc,
            integrations: &self.integrations,
            results: &self.results,
        }
    }
}

fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn stage<'r>(report: &'r [StageReport], kind: &str) -> &'r StageReport {
    report
        .iter()
        .find(|s| s.kind == kind)
        .unwrap_or_else(|| panic!("no stage report for {kind}"))
}

fn absent() -> Box<dyn std::error::Error + Send + Sync> {
    "not found".into()
}

#[tokio::test]
async fn absent_zone_is_created_with_file_bytes() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "zones/z1.json", r#"{"domain":"example.com"}"#);

    let mut mocks = Mocks::default();
    mocks
        .zones
        .expect_get_zone()
        .times(1)
        .returning(|name: &str| {
            assert_eq!(name, "z1");
            Err(absent())
        });
    mocks
        .zones
        .expect_create_zone()
        .times(1)
        .returning(|name: &str, content: &[u8]| {
            assert_eq!(name, "z1");
            assert_eq!(content, br#"{"domain":"example.com"}"#);
            Ok(Vec::new())
        });

    let report = apply(&ApplyConfig::new(dir.path()), mocks.clients())
        .await
        .expect("apply should succeed");

    let zones = stage(&report.stages, "managed zone");
    assert_eq!(zones.status, StageStatus::Applied);
    assert_eq!(zones.created, vec!["z1".to_string()]);
    assert!(report.integration.is_none());
}

#[tokio::test]
async fn present_connector_is_left_alone_and_later_stages_run() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "connectors/c1.json", r#"{"connectorVersion":"v1"}"#);
    write_file(dir.path(), "sfdcinstances/i1.json", r#"{"displayName":"i1"}"#);

    let mut mocks = Mocks::default();
    mocks
        .connections
        .expect_get_connection()
        .times(1)
        .returning(|_: &str| Ok(b"{}".to_vec()));
    mocks.connections.expect_create_connection().times(0);
    mocks
        .sfdc
        .expect_get_instance()
        .times(1)
        .returning(|_: &str| Err(absent()));
    mocks
        .sfdc
        .expect_create_instance()
        .times(1)
        .returning(|_: &[u8]| Ok(Vec::new()));

    let report = apply(&ApplyConfig::new(dir.path()), mocks.clients())
        .await
        .unwrap();

    let connectors = stage(&report.stages, "connector");
    assert!(connectors.created.is_empty());
    assert_eq!(connectors.existing, vec!["c1".to_string()]);
    assert_eq!(stage(&report.stages, "sfdc instance").created, vec!["i1".to_string()]);
}

#[tokio::test]
async fn second_run_creates_nothing() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "zones/z1.json", "{}");
    write_file(dir.path(), "zones/z2.json", "{}");

    let remote: Arc<Mutex<HashSet<String>>> = Arc::default();
    let mut mocks = Mocks::default();
    let seen = remote.clone();
    mocks.zones.expect_get_zone().returning(move |name: &str| {
        if seen.lock().unwrap().contains(name) {
            Ok(Vec::new())
        } else {
            Err(absent())
        }
    });
    let created = remote.clone();
    mocks
        .zones
        .expect_create_zone()
        .times(2)
        .returning(move |name: &str, _: &[u8]| {
            created.lock().unwrap().insert(name.to_string());
            Ok(Vec::new())
        });

    let config = ApplyConfig::new(dir.path());
    let first = apply(&config, mocks.clients()).await.unwrap();
    let second = apply(&config, mocks.clients()).await.unwrap();

    assert_eq!(first.created_count(), 2);
    assert_eq!(second.created_count(), 0);
    assert_eq!(
        stage(&second.stages, "managed zone").existing,
        vec!["z1".to_string(), "z2".to_string()]
    );
}

#[tokio::test]
async fn sfdc_channel_lookup_takes_channel_then_instance() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "sfdcchannels/inst__chan.json", r#"{"channelTopic":"/event/x"}"#);

    let mut mocks = Mocks::default();
    mocks
        .sfdc
        .expect_find_channel()
        .times(1)
        .returning(|channel: &str, instance: &str| {
            assert_eq!(channel, "chan");
            assert_eq!(instance, "inst");
            Err(absent())
        });
    mocks
        .sfdc
        .expect_create_channel()
        .times(1)
        .returning(|instance: &str, content: &[u8]| {
            assert_eq!(instance, "inst");
            assert_eq!(content, br#"{"channelTopic":"/event/x"}"#);
            Ok(Vec::new())
        });

    let report = apply(&ApplyConfig::new(dir.path()), mocks.clients())
        .await
        .unwrap();
    assert_eq!(
        stage(&report.stages, "sfdc channel").created,
        vec!["inst/chan".to_string()]
    );
}

#[tokio::test]
async fn badly_named_split_files_are_skipped_without_calls() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "sfdcchannels/nochannel.json", "{}");
    write_file(dir.path(), "sfdcchannels/a__b__c.json", "{}");
    write_file(dir.path(), "custom-connectors/noversion.json", "{}");
    write_file(dir.path(), "zones/z1.json", "{}");

    let mut mocks = Mocks::default();
    mocks.zones.expect_get_zone().returning(|_: &str| Ok(Vec::new()));

    let report = apply(&ApplyConfig::new(dir.path()), mocks.clients())
        .await
        .expect("naming violations must not abort the run");

    let channels = stage(&report.stages, "sfdc channel");
    assert_eq!(channels.status, StageStatus::Applied);
    assert_eq!(
        channels.ignored,
        vec!["a__b__c.json".to_string(), "nochannel.json".to_string()]
    );
    let custom = stage(&report.stages, "custom connector");
    assert!(custom.ignored.is_empty());
    assert!(custom.created.is_empty());
}

#[tokio::test]
async fn legacy_splitter_splits_on_single_underscore() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "custom-connectors/crm_2.json", r#"{"spec":"x"}"#);

    let mut mocks = Mocks::default();
    mocks
        .custom_connectors
        .expect_get_custom_connector_version()
        .times(1)
        .returning(|name: &str, version: &str| {
            assert_eq!((name, version), ("crm", "2"));
            Err(absent())
        });
    mocks
        .custom_connectors
        .expect_create_custom_connector_version()
        .times(1)
        .returning(|req| {
            assert_eq!(req.name, "crm");
            assert_eq!(req.version, "2");
            assert_eq!(req.service_account.as_deref(), Some("runner"));
            Ok(())
        });

    let mut config = ApplyConfig::new(dir.path());
    config.splitter = FileSplitter::Legacy;
    config.service_account = Some("runner".to_string());

    let report = apply(&config, mocks.clients()).await.unwrap();
    assert_eq!(
        stage(&report.stages, "custom connector").created,
        vec!["crm/2".to_string()]
    );
}

#[tokio::test]
async fn endpoint_is_created_from_its_service_attachment() {
    let dir = tempdir().unwrap();
    write_file(
        dir.path(),
        "endpoints/ep1.json",
        r#"{"serviceAttachment":"projects/p/regions/r/serviceAttachments/sa1"}"#,
    );

    let mut mocks = Mocks::default();
    mocks
        .endpoints
        .expect_endpoint_exists()
        .times(1)
        .returning(|_: &str| false);
    mocks
        .endpoints
        .expect_create_endpoint()
        .times(1)
        .returning(|name: &str, sa: &str, description: &str, wait: bool| {
            assert_eq!(name, "ep1");
            assert_eq!(sa, "projects/p/regions/r/serviceAttachments/sa1");
            assert_eq!(description, "");
            assert!(!wait);
            Ok(Vec::new())
        });

    let report = apply(&ApplyConfig::new(dir.path()), mocks.clients())
        .await
        .unwrap();
    assert_eq!(stage(&report.stages, "endpoint attachment").created, vec!["ep1".to_string()]);
}

#[tokio::test]
async fn auth_config_with_empty_version_counts_as_absent() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "authconfigs/present.json", "{}");
    write_file(dir.path(), "authconfigs/missing.json", r#"{"displayName":"missing"}"#);

    let mut mocks = Mocks::default();
    mocks
        .auth_configs
        .expect_find_auth_config()
        .returning(|name: &str| match name {
            "present" => Ok("3".to_string()),
            _ => Ok(String::new()),
        });
    mocks
        .auth_configs
        .expect_create_auth_config()
        .times(1)
        .returning(|content: &[u8]| {
            assert_eq!(content, br#"{"displayName":"missing"}"#);
            Ok(Vec::new())
        });

    let report = apply(&ApplyConfig::new(dir.path()), mocks.clients())
        .await
        .unwrap();
    let auth = stage(&report.stages, "authconfig");
    assert_eq!(auth.created, vec!["missing".to_string()]);
    assert_eq!(auth.existing, vec!["present".to_string()]);
}

#[tokio::test]
async fn inlines_javascript_then_versions_and_publishes_once() {
    let dir = tempdir().unwrap();
    write_file(
        dir.path(),
        "src/flow.json",
        r#"{"taskConfigs":[{"task":"JavaScriptTask","taskId":"1","parameters":{}},{"task":"FieldMappingTask","taskId":"2"}]}"#,
    );
    write_file(dir.path(), "src/javascript/javascript_1.js", "return 1;");

    let mut mocks = Mocks::default();
    mocks
        .integrations
        .expect_create_version()
        .times(1)
        .returning(|req| {
            assert_eq!(req.name, "flow");
            assert!(req.overrides.is_empty());
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            let script = &body["taskConfigs"][0]["parameters"]["script"];
            assert_eq!(script["key"], "script");
            assert_eq!(script["value"]["stringValue"], "return 1;");
            assert!(body["taskConfigs"][1].get("parameters").is_none());
            Ok(br#"{"name":"projects/p/locations/l/integrations/flow/versions/abc-1"}"#.to_vec())
        });
    mocks.integrations.expect_create_test_case().times(0);
    mocks
        .integrations
        .expect_publish_version()
        .times(1)
        .returning(|name: &str, version: &str, config_vars: &[u8]| {
            assert_eq!((name, version), ("flow", "abc-1"));
            assert!(config_vars.is_empty());
            Ok(Vec::new())
        });

    let report = apply(&ApplyConfig::new(dir.path()), mocks.clients())
        .await
        .unwrap();

    let published = report.integration.expect("integration should be published");
    assert_eq!(published.integration, "flow");
    assert_eq!(published.version, "abc-1");
    assert_eq!(published.inlined_code_files, 1);
    assert!(published.test_cases.is_empty());
    assert_eq!(published.result_artifact, None);
}

#[tokio::test]
async fn pipeline_run_attaches_tests_and_writes_result() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "src/a_flow.json", r#"{"triggerConfigs":[]}"#);
    write_file(dir.path(), "src/b_case.json", r#"{"displayName":"b_case"}"#);
    write_file(dir.path(), "dev/overrides/overrides.json", r#"{"connectionOverrides":[]}"#);
    write_file(dir.path(), "dev/config-variables/a_flow-config.json", r#"{"x":1}"#);

    let mut mocks = Mocks::default();
    mocks
        .integrations
        .expect_create_version()
        .times(1)
        .returning(|req| {
            assert_eq!(req.overrides, br#"{"connectionOverrides":[]}"#.to_vec());
            assert_eq!(req.user_label.as_deref(), Some("release-7"));
            Ok(br#"{"name":"projects/p/locations/l/integrations/a_flow/versions/9"}"#.to_vec())
        });
    mocks
        .integrations
        .expect_create_test_case()
        .times(1)
        .returning(|name: &str, version: &str, content: &str| {
            assert_eq!((name, version), ("a_flow", "9"));
            assert_eq!(content, r#"{"displayName":"b_case"}"#);
            Ok(Vec::new())
        });
    mocks
        .integrations
        .expect_publish_version()
        .times(1)
        .returning(|_: &str, _: &str, config_vars: &[u8]| {
            assert_eq!(config_vars, br#"{"x":1}"#);
            Ok(Vec::new())
        });
    mocks
        .results
        .expect_write_result()
        .times(1)
        .returning(|path: &str, status: &str| {
            assert_eq!(path, "gs://bucket/out");
            assert_eq!(status, "SUCCEEDED");
            Ok(())
        });

    let mut config = ApplyConfig::new(dir.path());
    config.env = Some("dev".to_string());
    config.user_label = Some("release-7".to_string());
    config.pipeline = Some(PipelineRun {
        pipeline: "deploy".to_string(),
        release: "r1".to_string(),
        output_path: "gs://bucket/out".to_string(),
    });

    let report = apply(&config, mocks.clients()).await.unwrap();
    let published = report.integration.unwrap();
    assert_eq!(published.test_cases, vec!["b_case".to_string()]);
    assert_eq!(published.result_artifact.as_deref(), Some("gs://bucket/out"));
}

#[tokio::test]
async fn result_file_failure_is_reported_after_publish() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "src/flow.json", "{}");

    let mut mocks = Mocks::default();
    mocks
        .integrations
        .expect_create_version()
        .returning(|_| Ok(br#"{"name":"integrations/flow/versions/1"}"#.to_vec()));
    mocks
        .integrations
        .expect_publish_version()
        .times(1)
        .returning(|_: &str, _: &str, _: &[u8]| Ok(Vec::new()));
    mocks
        .results
        .expect_write_result()
        .times(1)
        .returning(|_: &str, _: &str| Err("bucket not writable".into()));

    let mut config = ApplyConfig::new(dir.path());
    config.pipeline = Some(PipelineRun {
        pipeline: "deploy".to_string(),
        release: "r1".to_string(),
        output_path: "gs://bucket/out".to_string(),
    });

    let err = apply(&config, mocks.clients()).await.unwrap_err();
    assert!(matches!(err, ApplyError::ResultArtifact { ref path, .. } if path == "gs://bucket/out"));
}

#[tokio::test]
async fn missing_version_name_stops_before_tests_and_publish() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "src/flow.json", "{}");
    write_file(dir.path(), "src/t1.json", "{}");

    let mut mocks = Mocks::default();
    mocks
        .integrations
        .expect_create_version()
        .returning(|_| Ok(br#"{"state":"DRAFT"}"#.to_vec()));

    let err = apply(&ApplyConfig::new(dir.path()), mocks.clients())
        .await
        .unwrap_err();
    assert!(matches!(err, ApplyError::VersionNotFound));
}

#[tokio::test]
async fn skip_flags_skip_their_stages() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "authconfigs/a.json", "{}");
    write_file(dir.path(), "connectors/c.json", "{}");
    write_file(dir.path(), "custom-connectors/x__1.json", "{}");

    let mocks = Mocks::default();
    let mut config = ApplyConfig::new(dir.path());
    config.skip_authconfigs = true;
    config.skip_connectors = true;

    let report = apply(&config, mocks.clients()).await.unwrap();

    let kinds: Vec<(&str, StageStatus)> =
        report.stages.iter().map(|s| (s.kind, s.status)).collect();
    assert_eq!(
        kinds,
        vec![
            ("authconfig", StageStatus::Skipped),
            ("endpoint attachment", StageStatus::Absent),
            ("managed zone", StageStatus::Absent),
            ("custom connector", StageStatus::Skipped),
            ("connector", StageStatus::Skipped),
            ("sfdc instance", StageStatus::Absent),
            ("sfdc channel", StageStatus::Absent),
        ]
    );
}

#[tokio::test]
async fn first_create_error_stops_the_run() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "zones/z1.json", "{}");
    write_file(dir.path(), "zones/z2.json", "{}");
    write_file(dir.path(), "connectors/c1.json", "{}");

    let mut mocks = Mocks::default();
    mocks.zones.expect_get_zone().returning(|_: &str| Err(absent()));
    mocks
        .zones
        .expect_create_zone()
        .times(1)
        .returning(|_: &str, _: &[u8]| Err("quota exceeded".into()));

    let err = apply(&ApplyConfig::new(dir.path()), mocks.clients())
        .await
        .unwrap_err();
    match err {
        ApplyError::Remote { kind, name, .. } => {
            assert_eq!(kind, "managed zone");
            assert_eq!(name, "z1");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn empty_scaffold_is_a_no_op() {
    let dir = tempdir().unwrap();
    let mocks = Mocks::default();

    let report = apply(&ApplyConfig::new(dir.path()), mocks.clients())
        .await
        .unwrap();

    assert_eq!(report.stages.len(), 7);
    assert!(report.stages.iter().all(|s| s.status == StageStatus::Absent));
    assert!(report.integration.is_none());
}

#[tokio::test]
async fn missing_environment_folder_is_rejected() {
    let dir = tempdir().unwrap();
    let mocks = Mocks::default();
    let mut config = ApplyConfig::new(dir.path());
    config.env = Some("prod".to_string());

    let err = apply(&config, mocks.clients()).await.unwrap_err();
    assert!(matches!(err, ApplyError::InvalidScaffold { .. }));
}

#[tokio::test]
async fn service_account_project_without_name_is_rejected_before_any_call() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "zones/z1.json", "{}");
    let mocks = Mocks::default();
    let mut config = ApplyConfig::new(dir.path());
    config.service_account_project = Some("other-project".to_string());

    let err = apply(&config, mocks.clients()).await.unwrap_err();
    assert!(matches!(err, ApplyError::Config(_)));
}

#[tokio::test]
async fn multi_line_code_reaches_the_version_unchanged() {
    let dir = tempdir().unwrap();
    let script = "var a = \"one\";\nvar b = 2;\nreturn a + b;\n";
    let template = "local f = import \"functions\";\n{\n  out: f.upper(\"x\"),\n}\n";
    write_file(
        dir.path(),
        "src/flow.json",
        r#"{"taskConfigs":[{"task":"JavaScriptTask","taskId":"1"},{"task":"JsonnetMapperTask","taskId":"1"}]}"#,
    );
    write_file(dir.path(), "src/javascript/javascript_1.js", script);
    write_file(dir.path(), "src/datatransformer/datatransformer_1.jsonnet", template);

    let mut mocks = Mocks::default();
    mocks
        .integrations
        .expect_create_version()
        .times(1)
        .returning(move |req| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            assert_eq!(
                body["taskConfigs"][0]["parameters"]["script"]["value"]["stringValue"],
                script
            );
            assert_eq!(
                body["taskConfigs"][1]["parameters"]["template"]["value"]["stringValue"],
                template
            );
            Ok(br#"{"name":"integrations/flow/versions/2"}"#.to_vec())
        });
    mocks
        .integrations
        .expect_publish_version()
        .times(1)
        .returning(|_: &str, _: &str, _: &[u8]| Ok(Vec::new()));

    let report = apply(&ApplyConfig::new(dir.path()), mocks.clients())
        .await
        .unwrap();
    assert_eq!(report.integration.unwrap().inlined_code_files, 2);
}

#[tokio::test]
async fn connector_creation_forwards_run_options() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "connectors/c1.json", r#"{"connectorVersion":"v1"}"#);

    let mut mocks = Mocks::default();
    mocks
        .connections
        .expect_get_connection()
        .times(1)
        .returning(|_: &str| Err(absent()));
    mocks
        .connections
        .expect_create_connection()
        .times(1)
        .returning(|req| {
            assert_eq!(req.name, "c1");
            assert_eq!(req.content, br#"{"connectorVersion":"v1"}"#.to_vec());
            assert_eq!(req.service_account.as_deref(), Some("runner"));
            assert_eq!(req.service_account_project.as_deref(), Some("sa-project"));
            assert_eq!(req.encryption_key.as_deref(), Some("projects/p/locations/l/keyRings/k/cryptoKeys/c"));
            assert!(req.grant_permission);
            assert!(req.create_secret);
            assert!(req.wait);
            Ok(Vec::new())
        });

    let mut config = ApplyConfig::new(dir.path());
    config.service_account = Some("runner".to_string());
    config.service_account_project = Some("sa-project".to_string());
    config.encryption_key = Some("projects/p/locations/l/keyRings/k/cryptoKeys/c".to_string());
    config.grant_permission = true;
    config.create_secret = true;
    config.wait = true;

    let report = apply(&config, mocks.clients()).await.unwrap();
    assert_eq!(stage(&report.stages, "connector").created, vec!["c1".to_string()]);
}

#[tokio::test]
async fn test_case_with_invalid_utf8_stops_before_publish() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "src/flow.json", "{}");
    fs::write(dir.path().join("src/t1.json"), [0x7b, 0xff, 0xfe, 0x7d]).unwrap();

    let mut mocks = Mocks::default();
    mocks
        .integrations
        .expect_create_version()
        .times(1)
        .returning(|_| Ok(br#"{"name":"integrations/flow/versions/1"}"#.to_vec()));
    mocks.integrations.expect_create_test_case().times(0);
    mocks.integrations.expect_publish_version().times(0);

    let err = apply(&ApplyConfig::new(dir.path()), mocks.clients())
        .await
        .unwrap_err();
    assert!(matches!(err, ApplyError::Io { ref path, .. } if path.ends_with("t1.json")));
}
