#![doc = "REST implementation of every capability trait in `contract`, used by the CLI."]
//
//! # PlatformClient
//!
//! Talks to the Application Integration API (auth configs, SFDC, integration
//! versions, test cases), the Integration Connectors API (endpoint attachments,
//! managed zones, connections, custom connectors) and Cloud Storage (pipeline
//! result files) with a bearer token.
//!
//! - Construct with [`PlatformClient::new`] from resolved [`ClientSettings`].
//! - Non-2xx responses become [`HttpError`] carrying status and body.
//! - `wait` on connection / endpoint creation polls the long-running operation
//!   until it reports `done`.
//!
//! Provisioning side effects that need other APIs (IAM grants, Secret Manager
//! secrets, KMS decryption, integration overrides) are not performed here; the
//! client logs a warning when such an option is requested.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::contract::{
    AuthConfigApi, ClientError, ConnectionApi, CustomConnectorApi, EndpointApi, IntegrationApi,
    ManagedZoneApi, NewConnection, NewCustomConnectorVersion, NewVersion, ResultSink, SfdcApi,
    TestCaseSummary, VersionSelector,
};
use crate::load_config::ClientSettings;

const CONNECTORS_ROOT: &str = "https://connectors.googleapis.com/v1";
const STORAGE_ROOT: &str = "https://storage.googleapis.com";
const OPERATION_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
#[error("HTTP {status}: {body}")]
pub struct HttpError {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct NotFound(pub String);

pub struct PlatformClient {
    http: reqwest::Client,
    settings: ClientSettings,
    integrations_root: String,
    connectors_root: String,
    storage_root: String,
    poll_interval: Duration,
}

impl PlatformClient {
    pub fn new(settings: ClientSettings) -> Self {
        let integrations_root = settings
            .endpoints
            .integrations
            .clone()
            .unwrap_or_else(|| format!("https://{}-integrations.googleapis.com/v1", settings.region));
        let connectors_root = settings
            .endpoints
            .connectors
            .clone()
            .unwrap_or_else(|| CONNECTORS_ROOT.to_string());
        let storage_root = settings
            .endpoints
            .storage
            .clone()
            .unwrap_or_else(|| STORAGE_ROOT.to_string());
        info!(
            project = %settings.project,
            region = %settings.region,
            "Initialized PlatformClient"
        );
        PlatformClient {
            http: reqwest::Client::new(),
            integrations_root: integrations_root.trim_end_matches('/').to_string(),
            connectors_root: connectors_root.trim_end_matches('/').to_string(),
            storage_root: storage_root.trim_end_matches('/').to_string(),
            settings,
            poll_interval: OPERATION_POLL_INTERVAL,
        }
    }

    /// Shorten the operation poll interval (local emulators).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn integrations_url(&self, path: &str) -> String {
        format!(
            "{}/projects/{}/locations/{}/{}",
            self.integrations_root, self.settings.project, self.settings.region, path
        )
    }

    fn connectors_url(&self, path: &str) -> String {
        format!(
            "{}/projects/{}/locations/{}/{}",
            self.connectors_root, self.settings.project, self.settings.region, path
        )
    }

    /// Managed zones and custom connectors are global resources.
    fn connectors_global_url(&self, path: &str) -> String {
        format!(
            "{}/projects/{}/locations/global/{}",
            self.connectors_root, self.settings.project, path
        )
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.settings.token)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Vec<u8>, ClientError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?.to_vec();
        if !status.is_success() {
            let body = String::from_utf8_lossy(&body).into_owned();
            debug!(status = status.as_u16(), body = %body, "Request failed");
            return Err(Box::new(HttpError {
                status: status.as_u16(),
                body,
            }));
        }
        Ok(body)
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>, ClientError> {
        debug!(url, "GET");
        self.send(self.request(Method::GET, url).query(query)).await
    }

    async fn post(
        &self,
        url: &str,
        query: &[(&str, String)],
        body: Vec<u8>,
    ) -> Result<Vec<u8>, ClientError> {
        debug!(url, "POST");
        self.send(
            self.request(Method::POST, url)
                .query(query)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body),
        )
        .await
    }

    async fn post_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        body: &Value,
    ) -> Result<Vec<u8>, ClientError> {
        self.post(url, query, serde_json::to_vec(body)?).await
    }

    /// Poll a long-running operation until it is done.
    async fn wait_for_operation(&self, response: &[u8]) -> Result<Vec<u8>, ClientError> {
        let mut current: Value = serde_json::from_slice(response)?;
        let name = current
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| NotFound("operation name missing from response".to_string()))?;
        loop {
            if current.get("done").and_then(Value::as_bool).unwrap_or(false) {
                if let Some(err) = current.get("error") {
                    return Err(format!("operation {name} failed: {err}").into());
                }
                info!(operation = %name, "Operation completed");
                return Ok(serde_json::to_vec(&current)?);
            }
            info!(operation = %name, "Waiting for operation to complete");
            tokio::time::sleep(self.poll_interval).await;
            let url = format!("{}/{}", self.connectors_root, name);
            current = serde_json::from_slice(&self.get(&url, &[]).await?)?;
        }
    }

    fn service_account_email(&self, name: &str, project: Option<&str>) -> String {
        format!(
            "{}@{}.iam.gserviceaccount.com",
            name,
            project.unwrap_or(&self.settings.project)
        )
    }

    /// Id of the SFDC instance with the given display name.
    async fn sfdc_instance_id(&self, name: &str) -> Result<String, ClientError> {
        let body = self
            .get(
                &self.integrations_url("sfdcInstances"),
                &[("filter", display_name_filter(name))],
            )
            .await?;
        first_resource_id(&body, "sfdcInstances")
            .ok_or_else(|| Box::new(NotFound(format!("sfdc instance {name} not found"))) as ClientError)
    }

    fn version_url(&self, name: &str, version: &str, suffix: &str) -> String {
        self.integrations_url(&format!("integrations/{name}/versions/{version}{suffix}"))
    }
}

fn display_name_filter(name: &str) -> String {
    format!("displayName=\"{name}\"")
}

fn last_segment(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Last path segment of the first entry's `name` in a list response.
fn first_resource_id(body: &[u8], list_field: &str) -> Option<String> {
    let doc: Value = serde_json::from_slice(body).ok()?;
    doc.get(list_field)?
        .as_array()?
        .first()?
        .get("name")?
        .as_str()
        .map(|n| last_segment(n).to_string())
}

fn parse_object(content: &[u8]) -> Result<serde_json::Map<String, Value>, ClientError> {
    match serde_json::from_slice::<Value>(content)? {
        Value::Object(map) => Ok(map),
        _ => Err("definition must be a JSON object".into()),
    }
}

#[async_trait]
impl AuthConfigApi for PlatformClient {
    async fn find_auth_config(&self, name: &str) -> Result<String, ClientError> {
        let body = self
            .get(
                &self.integrations_url("authConfigs"),
                &[("filter", display_name_filter(name))],
            )
            .await?;
        Ok(first_resource_id(&body, "authConfigs").unwrap_or_default())
    }

    async fn create_auth_config(&self, content: &[u8]) -> Result<Vec<u8>, ClientError> {
        info!("Creating auth config");
        self.post(&self.integrations_url("authConfigs"), &[], content.to_vec())
            .await
    }
}

#[async_trait]
impl EndpointApi for PlatformClient {
    async fn endpoint_exists(&self, name: &str) -> bool {
        self.get(
            &self.connectors_url(&format!("endpointAttachments/{name}")),
            &[],
        )
        .await
        .is_ok()
    }

    async fn create_endpoint(
        &self,
        name: &str,
        service_attachment: &str,
        description: &str,
        wait: bool,
    ) -> Result<Vec<u8>, ClientError> {
        info!(endpoint = name, "Creating endpoint attachment");
        let body = json!({
            "serviceAttachment": service_attachment,
            "description": description,
        });
        let resp = self
            .post_json(
                &self.connectors_url("endpointAttachments"),
                &[("endpointAttachmentId", name.to_string())],
                &body,
            )
            .await?;
        if wait {
            return self.wait_for_operation(&resp).await;
        }
        Ok(resp)
    }
}

#[async_trait]
impl ManagedZoneApi for PlatformClient {
    async fn get_zone(&self, name: &str) -> Result<Vec<u8>, ClientError> {
        self.get(&self.connectors_global_url(&format!("managedZones/{name}")), &[])
            .await
    }

    async fn create_zone(&self, name: &str, content: &[u8]) -> Result<Vec<u8>, ClientError> {
        info!(zone = name, "Creating managed zone");
        self.post(
            &self.connectors_global_url("managedZones"),
            &[("managedZoneId", name.to_string())],
            content.to_vec(),
        )
        .await
    }

    async fn delete_zone(&self, name: &str) -> Result<Vec<u8>, ClientError> {
        info!(zone = name, "Deleting managed zone");
        let url = self.connectors_global_url(&format!("managedZones/{name}"));
        self.send(self.request(Method::DELETE, &url)).await
    }
}

#[async_trait]
impl ConnectionApi for PlatformClient {
    async fn get_connection(&self, name: &str) -> Result<Vec<u8>, ClientError> {
        self.get(
            &self.connectors_url(&format!("connections/{name}")),
            &[("view", "BASIC".to_string())],
        )
        .await
    }

    async fn create_connection(&self, req: NewConnection) -> Result<Vec<u8>, ClientError> {
        let mut body = parse_object(&req.content)?;
        if let Some(sa) = &req.service_account {
            let email = self.service_account_email(sa, req.service_account_project.as_deref());
            body.insert("serviceAccount".to_string(), Value::String(email));
        }
        if req.grant_permission || req.create_secret || req.encryption_key.is_some() {
            warn!(
                connection = %req.name,
                grant_permission = req.grant_permission,
                create_secret = req.create_secret,
                encryption_key = req.encryption_key.is_some(),
                "IAM grants, secrets and KMS decryption are not handled by this client"
            );
        }
        info!(connection = %req.name, wait = req.wait, "Creating connection");
        let resp = self
            .post_json(
                &self.connectors_url("connections"),
                &[("connectionId", req.name.clone())],
                &Value::Object(body),
            )
            .await?;
        if req.wait {
            return self.wait_for_operation(&resp).await;
        }
        Ok(resp)
    }
}

#[async_trait]
impl CustomConnectorApi for PlatformClient {
    async fn get_custom_connector_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Vec<u8>, ClientError> {
        self.get(
            &self.connectors_global_url(&format!(
                "customConnectors/{name}/customConnectorVersions/{version}"
            )),
            &[],
        )
        .await
    }

    async fn create_custom_connector_version(
        &self,
        req: NewCustomConnectorVersion,
    ) -> Result<(), ClientError> {
        let mut definition = parse_object(&req.content)?;
        let connector = definition
            .remove("customConnector")
            .unwrap_or_else(|| json!({ "customConnectorType": "OPEN_API" }));
        let mut version = match definition.remove("customConnectorVersion") {
            Some(Value::Object(map)) => map,
            _ => definition,
        };
        if let Some(sa) = &req.service_account {
            let email = self.service_account_email(sa, req.service_account_project.as_deref());
            version.insert("serviceAccount".to_string(), Value::String(email));
        }

        let parent = self.connectors_global_url(&format!("customConnectors/{}", req.name));
        if self.get(&parent, &[]).await.is_err() {
            info!(custom_connector = %req.name, "Creating custom connector");
            let resp = self
                .post_json(
                    &self.connectors_global_url("customConnectors"),
                    &[("customConnectorId", req.name.clone())],
                    &connector,
                )
                .await?;
            self.wait_for_operation(&resp).await?;
        }

        info!(custom_connector = %req.name, version = %req.version, "Creating custom connector version");
        self.post_json(
            &format!("{parent}/customConnectorVersions"),
            &[("customConnectorVersionId", req.version.clone())],
            &Value::Object(version),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SfdcApi for PlatformClient {
    async fn get_instance(&self, name: &str) -> Result<Vec<u8>, ClientError> {
        let id = self.sfdc_instance_id(name).await?;
        self.get(&self.integrations_url(&format!("sfdcInstances/{id}")), &[])
            .await
    }

    async fn create_instance(&self, content: &[u8]) -> Result<Vec<u8>, ClientError> {
        info!("Creating sfdc instance");
        self.post(&self.integrations_url("sfdcInstances"), &[], content.to_vec())
            .await
    }

    async fn find_channel(&self, channel: &str, instance: &str) -> Result<Vec<u8>, ClientError> {
        let instance_id = self.sfdc_instance_id(instance).await?;
        let body = self
            .get(
                &self.integrations_url(&format!("sfdcInstances/{instance_id}/sfdcChannels")),
                &[("filter", display_name_filter(channel))],
            )
            .await?;
        match first_resource_id(&body, "sfdcChannels") {
            Some(_) => Ok(body),
            None => Err(Box::new(NotFound(format!(
                "sfdc channel {channel} not found in instance {instance}"
            )))),
        }
    }

    async fn create_channel(&self, instance: &str, content: &[u8]) -> Result<Vec<u8>, ClientError> {
        let instance_id = self.sfdc_instance_id(instance).await?;
        info!(instance, "Creating sfdc channel");
        self.post(
            &self.integrations_url(&format!("sfdcInstances/{instance_id}/sfdcChannels")),
            &[],
            content.to_vec(),
        )
        .await
    }
}

#[async_trait]
impl IntegrationApi for PlatformClient {
    async fn create_version(&self, req: NewVersion) -> Result<Vec<u8>, ClientError> {
        let mut body = parse_object(&req.body)?;
        if let Some(label) = &req.user_label {
            body.insert("userLabel".to_string(), Value::String(label.clone()));
        }
        if !req.overrides.is_empty() {
            warn!(integration = %req.name, "Overrides are not applied by this client");
        }
        if req.grant_permission {
            warn!(integration = %req.name, "Trigger permissions are not granted by this client");
        }
        info!(integration = %req.name, "Creating integration version");
        self.post_json(
            &self.integrations_url(&format!("integrations/{}/versions", req.name)),
            &[("newIntegration", "true".to_string())],
            &Value::Object(body),
        )
        .await
    }

    async fn create_test_case(
        &self,
        name: &str,
        version: &str,
        content: &str,
    ) -> Result<Vec<u8>, ClientError> {
        self.post(
            &self.version_url(name, version, "/testCases"),
            &[],
            content.as_bytes().to_vec(),
        )
        .await
    }

    async fn publish_version(
        &self,
        name: &str,
        version: &str,
        config_vars: &[u8],
    ) -> Result<Vec<u8>, ClientError> {
        let body = if config_vars.is_empty() {
            json!({})
        } else {
            json!({ "configParameters": serde_json::from_slice::<Value>(config_vars)? })
        };
        info!(integration = name, version, "Publishing integration version");
        self.post_json(&self.version_url(name, version, ":publish"), &[], &body)
            .await
    }

    async fn resolve_version(
        &self,
        name: &str,
        selector: VersionSelector,
    ) -> Result<String, ClientError> {
        let filter = match selector {
            VersionSelector::Version(v) => return Ok(v),
            VersionSelector::UserLabel(label) => format!("userLabel=\"{label}\""),
            VersionSelector::Snapshot(snapshot) => format!("snapshotNumber={snapshot}"),
        };
        let body = self
            .get(
                &self.integrations_url(&format!("integrations/{name}/versions")),
                &[("filter", filter.clone())],
            )
            .await?;
        first_resource_id(&body, "integrationVersions").ok_or_else(|| {
            Box::new(NotFound(format!("no version of {name} matches {filter}"))) as ClientError
        })
    }

    async fn list_test_cases(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Vec<TestCaseSummary>, ClientError> {
        let body = self
            .get(&self.version_url(name, version, "/testCases"), &[])
            .await?;
        let doc: Value = serde_json::from_slice(&body)?;
        let cases = doc
            .get("testCases")
            .and_then(Value::as_array)
            .map(|cases| {
                cases
                    .iter()
                    .filter_map(|tc| {
                        let id = last_segment(tc.get("name")?.as_str()?).to_string();
                        let display_name = tc.get("displayName")?.as_str()?.to_string();
                        Some(TestCaseSummary { id, display_name })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(cases)
    }

    async fn execute_test_case(
        &self,
        name: &str,
        version: &str,
        test_case_id: &str,
        input: &str,
    ) -> Result<Vec<u8>, ClientError> {
        self.post(
            &self.version_url(name, version, &format!("/testCases/{test_case_id}:executeTest")),
            &[],
            input.as_bytes().to_vec(),
        )
        .await
    }
}

#[async_trait]
impl ResultSink for PlatformClient {
    async fn write_result(&self, path: &str, status: &str) -> Result<(), ClientError> {
        let body = serde_json::to_vec(&json!({ "resultStatus": status }))?;
        match path.strip_prefix("gs://") {
            Some(location) => {
                let (bucket, prefix) = location.split_once('/').unwrap_or((location, ""));
                let prefix = prefix.trim_matches('/');
                let object = if prefix.is_empty() {
                    "results.json".to_string()
                } else {
                    format!("{prefix}/results.json")
                };
                info!(bucket, object = %object, "Uploading result file");
                self.post(
                    &format!("{}/upload/storage/v1/b/{bucket}/o", self.storage_root),
                    &[("uploadType", "media".to_string()), ("name", object)],
                    body,
                )
                .await?;
            }
            None => {
                let dir = std::path::Path::new(path);
                tokio::fs::create_dir_all(dir).await?;
                tokio::fs::write(dir.join("results.json"), body).await?;
                info!(path, "Wrote result file");
            }
        }
        Ok(())
    }
}
