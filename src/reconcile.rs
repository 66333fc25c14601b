//! The create-if-absent loop shared by every resource kind.
//!
//! For each definition file in a kind's folder:
//!   1. derive the identifier from the file name,
//!   2. ask the platform whether it already exists,
//!   3. skip it if it does (no update, no diff),
//!   4. otherwise read the file and create it; a failure aborts the run.
//!
//! The per-kind details (folder, naming convention, probe and create calls)
//! live behind [`ResourceKind`], implemented in [`crate::kinds`].

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::{ApplyConfig, ScaffoldLayout};
use crate::error::ApplyError;
use crate::locate::{is_json_file, locate_files, ResourceFile};

/// Identifier(s) derived from a resource file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub name: String,
    /// Second segment for two-part names (custom connector version, SFDC channel).
    pub qualifier: Option<String>,
}

impl ResourceDescriptor {
    pub fn flat(name: impl Into<String>) -> Self {
        ResourceDescriptor {
            name: name.into(),
            qualifier: None,
        }
    }

    pub fn pair(name: impl Into<String>, qualifier: impl Into<String>) -> Self {
        ResourceDescriptor {
            name: name.into(),
            qualifier: Some(qualifier.into()),
        }
    }

    pub fn qualifier(&self) -> &str {
        self.qualifier.as_deref().unwrap_or("")
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}/{}", self.name, q),
            None => f.write_str(&self.name),
        }
    }
}

/// What happens to a file whose name breaks the kind's naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationPolicy {
    Warn,
    Silent,
}

#[async_trait]
pub trait ResourceKind: Send + Sync {
    /// Human-readable kind name used in logs, reports and errors.
    fn label(&self) -> &'static str;

    fn folder(&self, layout: &ScaffoldLayout) -> PathBuf;

    /// Identifier for a file. `None` marks a naming-convention violation.
    fn describe(&self, file: &ResourceFile, _config: &ApplyConfig) -> Option<ResourceDescriptor> {
        Some(ResourceDescriptor::flat(file.stem()))
    }

    fn violation_policy(&self) -> ViolationPolicy {
        ViolationPolicy::Warn
    }

    async fn exists(&self, id: &ResourceDescriptor) -> bool;

    async fn create(
        &self,
        id: &ResourceDescriptor,
        file: &ResourceFile,
        content: Vec<u8>,
        config: &ApplyConfig,
    ) -> Result<(), ApplyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Applied,
    /// The kind's folder does not exist in the scaffold.
    Absent,
    /// Turned off by a skip flag.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub kind: &'static str,
    pub status: StageStatus,
    pub created: Vec<String>,
    pub existing: Vec<String>,
    /// Files skipped with a naming-convention warning.
    pub ignored: Vec<String>,
}

impl StageReport {
    pub fn new(kind: &'static str, status: StageStatus) -> Self {
        StageReport {
            kind,
            status,
            created: Vec::new(),
            existing: Vec::new(),
            ignored: Vec::new(),
        }
    }
}

/// Apply every definition file of one kind.
pub async fn reconcile(
    kind: &dyn ResourceKind,
    layout: &ScaffoldLayout,
    config: &ApplyConfig,
) -> Result<StageReport, ApplyError> {
    let folder = kind.folder(layout);
    let Some(files) = locate_files(&folder, is_json_file)? else {
        return Ok(StageReport::new(kind.label(), StageStatus::Absent));
    };

    let mut report = StageReport::new(kind.label(), StageStatus::Applied);
    for file in files {
        let Some(id) = kind.describe(&file, config) else {
            if kind.violation_policy() == ViolationPolicy::Warn {
                warn!(
                    kind = kind.label(),
                    file = %file.file_name,
                    splitter = config.splitter.token(),
                    "File does not follow the naming convention, skipping"
                );
                report.ignored.push(file.file_name);
            }
            continue;
        };
        info!(kind = kind.label(), file = %file.file_name, "Found configuration");

        if kind.exists(&id).await {
            info!(kind = kind.label(), id = %id, "Already exists");
            report.existing.push(id.to_string());
            continue;
        }

        let content = file.read()?;
        info!(kind = kind.label(), id = %id, "Creating");
        if let Err(e) = kind.create(&id, &file, content, config).await {
            error!(kind = kind.label(), id = %id, error = %e, "Create failed");
            return Err(e);
        }
        report.created.push(id.to_string());
    }

    info!(
        kind = kind.label(),
        created = report.created.len(),
        existing = report.existing.len(),
        "Stage complete"
    );
    Ok(report)
}
