//! Apply orchestration: run every stage of a scaffold against one project/region.
//!
//! Stages run in a fixed order, one at a time:
//!
//! | # | stage | skipped by |
//! |---|-------|------------|
//! | 1 | auth configs | `skip_authconfigs` |
//! | 2 | endpoint attachments | |
//! | 3 | managed zones | |
//! | 4 | custom connectors | `skip_connectors` |
//! | 5 | connectors | `skip_connectors` |
//! | 6 | SFDC instances | |
//! | 7 | SFDC channels | |
//! | 8 | integration (inline code, version, tests, publish) | |
//!
//! A stage whose folder is missing does nothing. The first error stops the run
//! and is returned as is; resources created by earlier stages stay in place.

use tracing::{error, info};

use crate::config::{ApplyConfig, ScaffoldLayout};
use crate::contract::Clients;
use crate::error::ApplyError;
use crate::kinds::{
    labels, AuthConfigs, Connections, CustomConnectors, Endpoints, ManagedZones, SfdcChannels,
    SfdcInstances,
};
use crate::publish::{publish_integration, PublishReport};
use crate::reconcile::{reconcile, ResourceKind, StageReport, StageStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AuthConfigs,
    Endpoints,
    ManagedZones,
    CustomConnectors,
    Connectors,
    SfdcInstances,
    SfdcChannels,
    Integration,
}

/// Execution order of an apply run.
pub const STAGES: [Stage; 8] = [
    Stage::AuthConfigs,
    Stage::Endpoints,
    Stage::ManagedZones,
    Stage::CustomConnectors,
    Stage::Connectors,
    Stage::SfdcInstances,
    Stage::SfdcChannels,
    Stage::Integration,
];

impl Stage {
    /// Same label the stage's [`ResourceKind`] reports.
    pub fn label(self) -> &'static str {
        match self {
            Stage::AuthConfigs => labels::AUTH_CONFIG,
            Stage::Endpoints => labels::ENDPOINT,
            Stage::ManagedZones => labels::MANAGED_ZONE,
            Stage::CustomConnectors => labels::CUSTOM_CONNECTOR,
            Stage::Connectors => labels::CONNECTOR,
            Stage::SfdcInstances => labels::SFDC_INSTANCE,
            Stage::SfdcChannels => labels::SFDC_CHANNEL,
            Stage::Integration => "integration",
        }
    }

    pub fn skipped_by(self, config: &ApplyConfig) -> bool {
        match self {
            Stage::AuthConfigs => config.skip_authconfigs,
            Stage::CustomConnectors | Stage::Connectors => config.skip_connectors,
            _ => false,
        }
    }

    /// Resource adapter for the reconcile stages; `None` for the integration stage.
    fn kind<'a>(self, clients: &Clients<'a>) -> Option<Box<dyn ResourceKind + 'a>> {
        let kind: Box<dyn ResourceKind + 'a> = match self {
            Stage::AuthConfigs => Box::new(AuthConfigs(clients.auth_configs)),
            Stage::Endpoints => Box::new(Endpoints(clients.endpoints)),
            Stage::ManagedZones => Box::new(ManagedZones(clients.zones)),
            Stage::CustomConnectors => Box::new(CustomConnectors(clients.custom_connectors)),
            Stage::Connectors => Box::new(Connections(clients.connections)),
            Stage::SfdcInstances => Box::new(SfdcInstances(clients.sfdc)),
            Stage::SfdcChannels => Box::new(SfdcChannels(clients.sfdc)),
            Stage::Integration => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub stages: Vec<StageReport>,
    /// `None` when no integration definition was found.
    pub integration: Option<PublishReport>,
}

impl ApplyReport {
    pub fn created_count(&self) -> usize {
        self.stages.iter().map(|s| s.created.len()).sum()
    }
}

pub async fn apply(config: &ApplyConfig, clients: Clients<'_>) -> Result<ApplyReport, ApplyError> {
    config.validate()?;
    let layout = ScaffoldLayout::resolve(config)?;
    config.trace_loaded();

    info!(folder = %layout.root.display(), "[APPLY] Starting apply run");
    let mut report = ApplyReport::default();

    for stage in STAGES {
        if stage.skipped_by(config) {
            info!(stage = stage.label(), "[APPLY] Skipping stage by request");
            report
                .stages
                .push(StageReport::new(stage.label(), StageStatus::Skipped));
            continue;
        }

        let outcome = match stage.kind(&clients) {
            Some(kind) => reconcile(kind.as_ref(), &layout, config)
                .await
                .map(|stage_report| report.stages.push(stage_report)),
            None => publish_integration(&layout, config, clients.integrations, clients.results)
                .await
                .map(|published| report.integration = published),
        };
        if let Err(e) = outcome {
            error!(stage = stage.label(), error = %e, "[APPLY][ERROR] Stage failed");
            return Err(e);
        }
    }

    info!(
        created = report.created_count(),
        published = report.integration.is_some(),
        "[APPLY] Apply run complete"
    );
    Ok(report)
}
