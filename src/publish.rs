//! Version, test and publish workflow for the scaffolded integration flow.
//!
//! Sequence (no step is retried):
//!   1. pick the first integration definition under `src/` (none → warn, done),
//!   2. load `overrides/overrides.json` when present,
//!   3. inline code files into the definition,
//!   4. create a draft version and read its id from the response,
//!   5. attach every other definition under `src/` as a test case,
//!   6. publish with `config-variables/<name>-config.json` when present,
//!   7. for pipeline runs, write the result file.
//!
//! The result file is written only after a successful publish; a failure to
//! write it is reported as [`ApplyError::ResultArtifact`], separately from the
//! publish outcome.

use std::path::Path;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::code_inline::{build_code_map, set_code};
use crate::config::{ApplyConfig, ScaffoldLayout};
use crate::contract::{IntegrationApi, NewVersion, ResultSink};
use crate::error::ApplyError;
use crate::locate::{is_json_file, locate_files};

/// Status recorded in the pipeline result file.
pub const RESULT_SUCCEEDED: &str = "SUCCEEDED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub integration: String,
    pub version: String,
    pub inlined_code_files: usize,
    pub test_cases: Vec<String>,
    /// Where the result file went, for pipeline runs.
    pub result_artifact: Option<String>,
}

/// Version id from a create-version response: the last segment of its `name`.
pub fn extract_version_id(response: &[u8]) -> Result<String, ApplyError> {
    let doc: Value = serde_json::from_slice(response).map_err(|source| ApplyError::Json {
        context: "create version response".to_string(),
        source,
    })?;
    let name = doc.get("name").and_then(Value::as_str).unwrap_or("");
    let version = name.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if version.is_empty() {
        return Err(ApplyError::VersionNotFound);
    }
    Ok(version.to_string())
}

/// Read a file if it exists; a missing file yields no bytes.
fn read_optional(path: &Path) -> Result<Vec<u8>, ApplyError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => std::fs::read(path).map_err(|e| ApplyError::io(path, e)),
        _ => Ok(Vec::new()),
    }
}

pub async fn publish_integration(
    layout: &ScaffoldLayout,
    config: &ApplyConfig,
    integrations: &dyn IntegrationApi,
    results: &dyn ResultSink,
) -> Result<Option<PublishReport>, ApplyError> {
    let definitions = locate_files(&layout.integration_src(), is_json_file)?.unwrap_or_default();
    let Some((definition, test_cases)) = definitions.split_first() else {
        warn!(folder = %layout.integration_src().display(), "No integration files were found");
        return Ok(None);
    };
    let name = definition.stem().to_string();
    info!(integration = %name, file = %definition.file_name, "Found configuration for integration");

    let mut body = definition.read()?;

    let overrides_file = layout.overrides_file();
    let overrides = read_optional(&overrides_file)?;
    if !overrides.is_empty() {
        info!(file = %overrides_file.display(), "Found overrides file");
    }

    let code_map = build_code_map(&layout.javascript(), &layout.datatransformer())?;
    if !code_map.is_empty() {
        body = set_code(&body, &code_map)?;
        info!(integration = %name, files = code_map.len(), "Inlined code into integration");
    }

    info!(integration = %name, "Creating integration version");
    let response = integrations
        .create_version(NewVersion {
            name: name.clone(),
            body,
            overrides,
            user_label: config.user_label.clone(),
            grant_permission: config.grant_permission,
        })
        .await
        .map_err(|e| {
            error!(integration = %name, error = %e, "Create version failed");
            ApplyError::remote("integration", &name, e)
        })?;
    let version = extract_version_id(&response)?;
    info!(integration = %name, version = %version, "Created integration version");

    let mut attached = Vec::new();
    for test_case in test_cases {
        info!(integration = %name, file = %test_case.file_name, "Found test case file");
        let content = test_case.read_to_string()?;
        integrations
            .create_test_case(&name, &version, &content)
            .await
            .map_err(|e| {
                error!(file = %test_case.file_name, error = %e, "Create test case failed");
                ApplyError::remote("test case", test_case.stem(), e)
            })?;
        attached.push(test_case.stem().to_string());
    }

    let config_vars = read_optional(&layout.config_variables_file(&name))?;
    info!(
        integration = %name,
        version = %version,
        config_variables = !config_vars.is_empty(),
        "Publishing integration"
    );
    integrations
        .publish_version(&name, &version, &config_vars)
        .await
        .map_err(|e| {
            error!(integration = %name, version = %version, error = %e, "Publish failed");
            ApplyError::remote("integration", &name, e)
        })?;

    let mut result_artifact = None;
    if let Some(run) = &config.pipeline {
        info!(pipeline = %run.pipeline, path = %run.output_path, "Writing result file");
        results
            .write_result(&run.output_path, RESULT_SUCCEEDED)
            .await
            .map_err(|source| {
                error!(path = %run.output_path, error = %source, "Result file write failed");
                ApplyError::ResultArtifact {
                    path: run.output_path.clone(),
                    source,
                }
            })?;
        result_artifact = Some(run.output_path.clone());
    }

    Ok(Some(PublishReport {
        integration: name,
        version,
        inlined_code_files: code_map.len(),
        test_cases: attached,
        result_artifact,
    }))
}
