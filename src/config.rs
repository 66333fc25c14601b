//! Run-scoped configuration for one apply invocation.
//!
//! An [`ApplyConfig`] is built once (by the CLI or a test), validated, and then
//! passed by reference to every stage. Nothing in the pipeline reads ambient or
//! global state.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::ApplyError;

/// Token used to split two-part resource file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileSplitter {
    /// `name__version.json`
    #[default]
    Default,
    /// `name_version.json`
    Legacy,
}

impl FileSplitter {
    pub fn token(self) -> &'static str {
        match self {
            FileSplitter::Default => "__",
            FileSplitter::Legacy => "_",
        }
    }

    pub fn from_use_underscore(use_underscore: bool) -> Self {
        if use_underscore {
            FileSplitter::Legacy
        } else {
            FileSplitter::Default
        }
    }
}

/// Set when the run is driven by a release pipeline; enables the result file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun {
    pub pipeline: String,
    pub release: String,
    pub output_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyConfig {
    /// Root of the scaffolded configuration.
    pub folder: PathBuf,
    /// Optional environment sub-folder holding per-environment resources.
    pub env: Option<String>,
    pub user_label: Option<String>,
    pub service_account: Option<String>,
    pub service_account_project: Option<String>,
    pub encryption_key: Option<String>,
    pub grant_permission: bool,
    pub create_secret: bool,
    pub wait: bool,
    pub skip_authconfigs: bool,
    pub skip_connectors: bool,
    pub splitter: FileSplitter,
    pub pipeline: Option<PipelineRun>,
}

impl ApplyConfig {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        ApplyConfig {
            folder: folder.into(),
            ..Default::default()
        }
    }

    /// Build the pipeline section from the three raw flags, which must be set together.
    pub fn pipeline_from_flags(
        pipeline: Option<String>,
        release: Option<String>,
        output_path: Option<String>,
    ) -> Result<Option<PipelineRun>, ApplyError> {
        match (pipeline, release, output_path) {
            (None, None, None) => Ok(None),
            (Some(pipeline), Some(release), Some(output_path)) => Ok(Some(PipelineRun {
                pipeline,
                release,
                output_path,
            })),
            _ => Err(ApplyError::Config(
                "release, pipeline and outputGCSPath must be set".to_string(),
            )),
        }
    }

    pub fn validate(&self) -> Result<(), ApplyError> {
        if self.folder.as_os_str().is_empty() {
            return Err(ApplyError::Config("folder must be supplied".to_string()));
        }
        if let Some(run) = &self.pipeline {
            if run.pipeline.is_empty() || run.release.is_empty() || run.output_path.is_empty() {
                return Err(ApplyError::Config(
                    "release, pipeline and outputGCSPath must be set".to_string(),
                ));
            }
        }
        if self.service_account.is_none() && self.service_account_project.is_some() {
            return Err(ApplyError::Config(
                "service account project requires a service account name".to_string(),
            ));
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            folder = %self.folder.display(),
            env = self.env.as_deref().unwrap_or(""),
            splitter = self.splitter.token(),
            skip_authconfigs = self.skip_authconfigs,
            skip_connectors = self.skip_connectors,
            pipeline = self.pipeline.as_ref().map(|p| p.pipeline.as_str()).unwrap_or(""),
            "Loaded apply configuration"
        );
        debug!(?self, "Apply configuration (full debug)");
    }
}

/// Concrete folder and file locations for one scaffold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldLayout {
    /// `<folder>/<env>`, or `<folder>` when no environment is set.
    pub root: PathBuf,
    /// Always `<folder>`; integration sources are shared across environments.
    pub source_root: PathBuf,
}

impl ScaffoldLayout {
    /// Resolve and check the scaffold folder. The environment folder must exist.
    pub fn resolve(config: &ApplyConfig) -> Result<Self, ApplyError> {
        let root = match &config.env {
            Some(env) if !env.is_empty() => config.folder.join(env),
            _ => config.folder.clone(),
        };
        match std::fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => Ok(ScaffoldLayout {
                root,
                source_root: config.folder.clone(),
            }),
            _ => Err(ApplyError::InvalidScaffold { path: root }),
        }
    }

    pub fn auth_configs(&self) -> PathBuf {
        self.root.join("authconfigs")
    }

    pub fn endpoints(&self) -> PathBuf {
        self.root.join("endpoints")
    }

    pub fn zones(&self) -> PathBuf {
        self.root.join("zones")
    }

    pub fn connectors(&self) -> PathBuf {
        self.root.join("connectors")
    }

    pub fn custom_connectors(&self) -> PathBuf {
        self.root.join("custom-connectors")
    }

    pub fn sfdc_instances(&self) -> PathBuf {
        self.root.join("sfdcinstances")
    }

    pub fn sfdc_channels(&self) -> PathBuf {
        self.root.join("sfdcchannels")
    }

    pub fn overrides_file(&self) -> PathBuf {
        self.root.join("overrides").join("overrides.json")
    }

    pub fn config_variables_file(&self, integration: &str) -> PathBuf {
        self.root
            .join("config-variables")
            .join(format!("{integration}-config.json"))
    }

    pub fn integration_src(&self) -> PathBuf {
        self.source_root.join("src")
    }

    pub fn javascript(&self) -> PathBuf {
        self.integration_src().join("javascript")
    }

    pub fn datatransformer(&self) -> PathBuf {
        self.integration_src().join("datatransformer")
    }
}
