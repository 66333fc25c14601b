//! Stand-alone test-case commands: attach one test case to a version, or
//! execute test cases against a version.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::contract::{IntegrationApi, VersionSelector};
use crate::error::ApplyError;
use crate::locate::{is_json_file, locate_files};

/// Attach the test case stored at `content_path` to an integration version.
pub async fn create_test_case(
    integrations: &dyn IntegrationApi,
    name: &str,
    version: &str,
    content_path: &Path,
) -> Result<Vec<u8>, ApplyError> {
    let content =
        std::fs::read_to_string(content_path).map_err(|e| ApplyError::io(content_path, e))?;
    info!(integration = name, version, path = %content_path.display(), "Creating test case");
    integrations
        .create_test_case(name, version, &content)
        .await
        .map_err(|e| ApplyError::remote("test case", name, e))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestCaseInput {
    /// One test case, identified by id, with its input parameters.
    File { test_case_id: String, path: PathBuf },
    /// A folder of `<display name>.json` input files.
    Folder(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteRequest {
    pub name: String,
    pub selector: VersionSelector,
    pub input: TestCaseInput,
}

impl ExecuteRequest {
    /// Validate the raw command flags.
    pub fn from_flags(
        name: String,
        version: Option<String>,
        user_label: Option<String>,
        snapshot: Option<String>,
        test_case_id: Option<String>,
        input_file: Option<PathBuf>,
        input_folder: Option<PathBuf>,
    ) -> Result<Self, ApplyError> {
        let selector = match (version, user_label, snapshot) {
            (Some(v), None, None) => VersionSelector::Version(v),
            (None, Some(l), None) => VersionSelector::UserLabel(l),
            (None, None, Some(s)) => VersionSelector::Snapshot(s),
            (None, None, None) => {
                return Err(ApplyError::Config(
                    "one of version, user-label or snapshot must be passed".to_string(),
                ))
            }
            _ => {
                return Err(ApplyError::Config(
                    "only one of version, user-label or snapshot can be passed".to_string(),
                ))
            }
        };

        let input = match (test_case_id, input_file, input_folder) {
            (_, Some(_), Some(_)) => {
                return Err(ApplyError::Config(
                    "only one of input-file or input-folder can be passed".to_string(),
                ))
            }
            (Some(test_case_id), Some(path), None) => TestCaseInput::File { test_case_id, path },
            (None, Some(_), None) => {
                return Err(ApplyError::Config(
                    "test case id must be set with input-file".to_string(),
                ))
            }
            (Some(_), None, Some(_)) => {
                return Err(ApplyError::Config(
                    "test case id cannot be set with input-folder".to_string(),
                ))
            }
            (None, None, Some(folder)) => TestCaseInput::Folder(folder),
            (_, None, None) => {
                return Err(ApplyError::Config(
                    "at least one of input-file or input-folder must be passed".to_string(),
                ))
            }
        };

        Ok(ExecuteRequest {
            name,
            selector,
            input,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub version: String,
    /// Ids of the executed test cases.
    pub executed: Vec<String>,
    /// Input files without a test case of the same display name.
    pub unmatched: Vec<String>,
}

pub async fn execute_test_cases(
    integrations: &dyn IntegrationApi,
    req: &ExecuteRequest,
) -> Result<ExecutionReport, ApplyError> {
    let version = match &req.selector {
        VersionSelector::Version(v) => v.clone(),
        selector => integrations
            .resolve_version(&req.name, selector.clone())
            .await
            .map_err(|e| ApplyError::remote("integration", &req.name, e))?,
    };
    let mut report = ExecutionReport {
        version: version.clone(),
        ..Default::default()
    };

    match &req.input {
        TestCaseInput::File { test_case_id, path } => {
            let input = std::fs::read_to_string(path).map_err(|e| ApplyError::io(path, e))?;
            run_one(integrations, &req.name, &version, test_case_id, &input).await?;
            report.executed.push(test_case_id.clone());
        }
        TestCaseInput::Folder(folder) => {
            let Some(files) = locate_files(folder, is_json_file)? else {
                return Err(ApplyError::Config(format!(
                    "input folder {} does not exist",
                    folder.display()
                )));
            };
            let test_cases = integrations
                .list_test_cases(&req.name, &version)
                .await
                .map_err(|e| ApplyError::remote("integration", &req.name, e))?;

            for file in files {
                let Some(test_case) = test_cases.iter().find(|tc| tc.display_name == file.stem())
                else {
                    warn!(file = %file.file_name, "No test case with a matching display name, skipping");
                    report.unmatched.push(file.file_name.clone());
                    continue;
                };
                let input = file.read_to_string()?;
                run_one(integrations, &req.name, &version, &test_case.id, &input).await?;
                report.executed.push(test_case.id.clone());
            }
        }
    }
    Ok(report)
}

async fn run_one(
    integrations: &dyn IntegrationApi,
    name: &str,
    version: &str,
    test_case_id: &str,
    input: &str,
) -> Result<(), ApplyError> {
    integrations
        .execute_test_case(name, version, test_case_id, input)
        .await
        .map_err(|e| ApplyError::remote("test case", test_case_id, e))?;
    info!(integration = name, version, test_case_id, "Test case executed successfully");
    Ok(())
}
