//! One [`ResourceKind`] adapter per scaffolded resource type.
//!
//! Each adapter turns its collaborator's probe into a plain `exists -> bool`
//! while keeping the collaborator's own notion of presence: a boolean for
//! endpoints, a non-empty version for auth configs, and a successful lookup for
//! everything else.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{ApplyConfig, ScaffoldLayout};
use crate::contract::{
    AuthConfigApi, ConnectionApi, CustomConnectorApi, EndpointApi, ManagedZoneApi, NewConnection,
    NewCustomConnectorVersion, SfdcApi,
};
use crate::error::ApplyError;
use crate::locate::{split_identifier, ResourceFile};
use crate::reconcile::{ResourceDescriptor, ResourceKind, ViolationPolicy};

/// Resource kind names shared by the adapters and the apply stages.
pub mod labels {
    pub const AUTH_CONFIG: &str = "authconfig";
    pub const ENDPOINT: &str = "endpoint attachment";
    pub const MANAGED_ZONE: &str = "managed zone";
    pub const CONNECTOR: &str = "connector";
    pub const CUSTOM_CONNECTOR: &str = "custom connector";
    pub const SFDC_INSTANCE: &str = "sfdc instance";
    pub const SFDC_CHANNEL: &str = "sfdc channel";
}

/// Read the `serviceAttachment` field of an endpoint attachment definition.
pub fn extract_service_attachment(content: &[u8], file: &str) -> Result<String, ApplyError> {
    let doc: Value = serde_json::from_slice(content).map_err(|source| ApplyError::Json {
        context: file.to_string(),
        source,
    })?;
    match doc.get("serviceAttachment").and_then(Value::as_str) {
        Some(sa) if !sa.is_empty() => Ok(sa.to_string()),
        _ => Err(ApplyError::ServiceAttachmentNotFound {
            file: file.to_string(),
        }),
    }
}

pub struct AuthConfigs<'a>(pub &'a dyn AuthConfigApi);

#[async_trait]
impl<'a> ResourceKind for AuthConfigs<'a> {
    fn label(&self) -> &'static str {
        labels::AUTH_CONFIG
    }

    fn folder(&self, layout: &ScaffoldLayout) -> PathBuf {
        layout.auth_configs()
    }

    async fn exists(&self, id: &ResourceDescriptor) -> bool {
        // lookup errors count as "not found"
        matches!(self.0.find_auth_config(&id.name).await, Ok(version) if !version.is_empty())
    }

    async fn create(
        &self,
        id: &ResourceDescriptor,
        _file: &ResourceFile,
        content: Vec<u8>,
        _config: &ApplyConfig,
    ) -> Result<(), ApplyError> {
        self.0
            .create_auth_config(&content)
            .await
            .map_err(|e| ApplyError::remote(self.label(), &id.name, e))?;
        Ok(())
    }
}

pub struct Endpoints<'a>(pub &'a dyn EndpointApi);

#[async_trait]
impl<'a> ResourceKind for Endpoints<'a> {
    fn label(&self) -> &'static str {
        labels::ENDPOINT
    }

    fn folder(&self, layout: &ScaffoldLayout) -> PathBuf {
        layout.endpoints()
    }

    async fn exists(&self, id: &ResourceDescriptor) -> bool {
        self.0.endpoint_exists(&id.name).await
    }

    async fn create(
        &self,
        id: &ResourceDescriptor,
        file: &ResourceFile,
        content: Vec<u8>,
        _config: &ApplyConfig,
    ) -> Result<(), ApplyError> {
        let service_attachment = extract_service_attachment(&content, &file.file_name)?;
        self.0
            .create_endpoint(&id.name, &service_attachment, "", false)
            .await
            .map_err(|e| ApplyError::remote(self.label(), &id.name, e))?;
        Ok(())
    }
}

pub struct ManagedZones<'a>(pub &'a dyn ManagedZoneApi);

#[async_trait]
impl<'a> ResourceKind for ManagedZones<'a> {
    fn label(&self) -> &'static str {
        labels::MANAGED_ZONE
    }

    fn folder(&self, layout: &ScaffoldLayout) -> PathBuf {
        layout.zones()
    }

    async fn exists(&self, id: &ResourceDescriptor) -> bool {
        self.0.get_zone(&id.name).await.is_ok()
    }

    async fn create(
        &self,
        id: &ResourceDescriptor,
        _file: &ResourceFile,
        content: Vec<u8>,
        _config: &ApplyConfig,
    ) -> Result<(), ApplyError> {
        self.0
            .create_zone(&id.name, &content)
            .await
            .map_err(|e| ApplyError::remote(self.label(), &id.name, e))?;
        Ok(())
    }
}

pub struct Connections<'a>(pub &'a dyn ConnectionApi);

#[async_trait]
impl<'a> ResourceKind for Connections<'a> {
    fn label(&self) -> &'static str {
        labels::CONNECTOR
    }

    fn folder(&self, layout: &ScaffoldLayout) -> PathBuf {
        layout.connectors()
    }

    async fn exists(&self, id: &ResourceDescriptor) -> bool {
        self.0.get_connection(&id.name).await.is_ok()
    }

    async fn create(
        &self,
        id: &ResourceDescriptor,
        _file: &ResourceFile,
        content: Vec<u8>,
        config: &ApplyConfig,
    ) -> Result<(), ApplyError> {
        let req = NewConnection {
            name: id.name.clone(),
            content,
            service_account: config.service_account.clone(),
            service_account_project: config.service_account_project.clone(),
            encryption_key: config.encryption_key.clone(),
            grant_permission: config.grant_permission,
            create_secret: config.create_secret,
            wait: config.wait,
        };
        self.0
            .create_connection(req)
            .await
            .map_err(|e| ApplyError::remote(self.label(), &id.name, e))?;
        Ok(())
    }
}

/// Files are named `<name><sep><version>.json`; other names are ignored without a warning.
pub struct CustomConnectors<'a>(pub &'a dyn CustomConnectorApi);

#[async_trait]
impl<'a> ResourceKind for CustomConnectors<'a> {
    fn label(&self) -> &'static str {
        labels::CUSTOM_CONNECTOR
    }

    fn folder(&self, layout: &ScaffoldLayout) -> PathBuf {
        layout.custom_connectors()
    }

    fn describe(&self, file: &ResourceFile, config: &ApplyConfig) -> Option<ResourceDescriptor> {
        split_identifier(file.stem(), config.splitter)
            .map(|(name, version)| ResourceDescriptor::pair(name, version))
    }

    fn violation_policy(&self) -> ViolationPolicy {
        ViolationPolicy::Silent
    }

    async fn exists(&self, id: &ResourceDescriptor) -> bool {
        self.0
            .get_custom_connector_version(&id.name, id.qualifier())
            .await
            .is_ok()
    }

    async fn create(
        &self,
        id: &ResourceDescriptor,
        _file: &ResourceFile,
        content: Vec<u8>,
        config: &ApplyConfig,
    ) -> Result<(), ApplyError> {
        let req = NewCustomConnectorVersion {
            name: id.name.clone(),
            version: id.qualifier().to_string(),
            content,
            service_account: config.service_account.clone(),
            service_account_project: config.service_account_project.clone(),
        };
        self.0
            .create_custom_connector_version(req)
            .await
            .map_err(|e| ApplyError::remote(self.label(), id.to_string(), e))
    }
}

pub struct SfdcInstances<'a>(pub &'a dyn SfdcApi);

#[async_trait]
impl<'a> ResourceKind for SfdcInstances<'a> {
    fn label(&self) -> &'static str {
        labels::SFDC_INSTANCE
    }

    fn folder(&self, layout: &ScaffoldLayout) -> PathBuf {
        layout.sfdc_instances()
    }

    async fn exists(&self, id: &ResourceDescriptor) -> bool {
        self.0.get_instance(&id.name).await.is_ok()
    }

    async fn create(
        &self,
        id: &ResourceDescriptor,
        _file: &ResourceFile,
        content: Vec<u8>,
        _config: &ApplyConfig,
    ) -> Result<(), ApplyError> {
        self.0
            .create_instance(&content)
            .await
            .map_err(|e| ApplyError::remote(self.label(), &id.name, e))?;
        Ok(())
    }
}

/// Files are named `<instance><sep><channel>.json`. The lookup takes the channel first.
pub struct SfdcChannels<'a>(pub &'a dyn SfdcApi);

#[async_trait]
impl<'a> ResourceKind for SfdcChannels<'a> {
    fn label(&self) -> &'static str {
        labels::SFDC_CHANNEL
    }

    fn folder(&self, layout: &ScaffoldLayout) -> PathBuf {
        layout.sfdc_channels()
    }

    fn describe(&self, file: &ResourceFile, config: &ApplyConfig) -> Option<ResourceDescriptor> {
        split_identifier(file.stem(), config.splitter)
            .map(|(instance, channel)| ResourceDescriptor::pair(instance, channel))
    }

    async fn exists(&self, id: &ResourceDescriptor) -> bool {
        self.0.find_channel(id.qualifier(), &id.name).await.is_ok()
    }

    async fn create(
        &self,
        id: &ResourceDescriptor,
        _file: &ResourceFile,
        content: Vec<u8>,
        _config: &ApplyConfig,
    ) -> Result<(), ApplyError> {
        self.0
            .create_channel(&id.name, &content)
            .await
            .map_err(|e| ApplyError::remote(self.label(), id.to_string(), e))?;
        Ok(())
    }
}
