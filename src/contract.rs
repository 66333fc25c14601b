//! # contract: capability interfaces consumed by the apply pipeline
//!
//! Every remote concern (auth configs, endpoints, managed zones, connections,
//! custom connectors, SFDC instances and channels, integration versions, test
//! cases and pipeline result files) is reached through one of the traits below.
//! The pipeline never talks HTTP itself.
//!
//! ## Probe styles
//! The traits keep the probe style each platform API naturally offers: a plain
//! boolean for endpoints, a version string for auth configs, and "an error means
//! absent" for most of the others. [`crate::kinds`] adapts all of them to a
//! single `exists -> bool` seam.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`; the mocks are exported through the
//!   default `test-export-mocks` feature so integration tests can use them.
//!
//! ## Implementations
//! - [`crate::client::PlatformClient`] implements all of them over REST.

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Error returned by every collaborator call.
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// Everything needed to create a connection from its scaffolded definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConnection {
    pub name: String,
    pub content: Vec<u8>,
    pub service_account: Option<String>,
    pub service_account_project: Option<String>,
    /// Cloud KMS key used to decrypt secrets in the definition.
    pub encryption_key: Option<String>,
    pub grant_permission: bool,
    pub create_secret: bool,
    /// Block until the long-running create operation finishes.
    pub wait: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomConnectorVersion {
    pub name: String,
    pub version: String,
    pub content: Vec<u8>,
    pub service_account: Option<String>,
    pub service_account_project: Option<String>,
}

/// A new draft version of an integration flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVersion {
    pub name: String,
    pub body: Vec<u8>,
    pub overrides: Vec<u8>,
    pub user_label: Option<String>,
    pub grant_permission: bool,
}

/// How a command identifies an existing integration version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    Version(String),
    UserLabel(String),
    Snapshot(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseSummary {
    pub id: String,
    pub display_name: String,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait AuthConfigApi: Send + Sync {
    /// Look up an auth config by display name. Returns its version id, empty when none matched.
    async fn find_auth_config(&self, name: &str) -> Result<String, ClientError>;

    async fn create_auth_config(&self, content: &[u8]) -> Result<Vec<u8>, ClientError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait EndpointApi: Send + Sync {
    async fn endpoint_exists(&self, name: &str) -> bool;

    async fn create_endpoint(
        &self,
        name: &str,
        service_attachment: &str,
        description: &str,
        wait: bool,
    ) -> Result<Vec<u8>, ClientError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ManagedZoneApi: Send + Sync {
    /// Fetch a managed zone. An error means the zone does not exist.
    async fn get_zone(&self, name: &str) -> Result<Vec<u8>, ClientError>;

    async fn create_zone(&self, name: &str, content: &[u8]) -> Result<Vec<u8>, ClientError>;

    async fn delete_zone(&self, name: &str) -> Result<Vec<u8>, ClientError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ConnectionApi: Send + Sync {
    /// Fetch a connection. An error means the connection does not exist.
    async fn get_connection(&self, name: &str) -> Result<Vec<u8>, ClientError>;

    async fn create_connection(&self, req: NewConnection) -> Result<Vec<u8>, ClientError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CustomConnectorApi: Send + Sync {
    async fn get_custom_connector_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Vec<u8>, ClientError>;

    async fn create_custom_connector_version(
        &self,
        req: NewCustomConnectorVersion,
    ) -> Result<(), ClientError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SfdcApi: Send + Sync {
    async fn get_instance(&self, name: &str) -> Result<Vec<u8>, ClientError>;

    async fn create_instance(&self, content: &[u8]) -> Result<Vec<u8>, ClientError>;

    /// Find a channel of an instance. Note the argument order: channel first.
    async fn find_channel(&self, channel: &str, instance: &str) -> Result<Vec<u8>, ClientError>;

    async fn create_channel(&self, instance: &str, content: &[u8]) -> Result<Vec<u8>, ClientError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait IntegrationApi: Send + Sync {
    /// Submit a new draft version; returns the raw response body.
    async fn create_version(&self, req: NewVersion) -> Result<Vec<u8>, ClientError>;

    async fn create_test_case(
        &self,
        name: &str,
        version: &str,
        content: &str,
    ) -> Result<Vec<u8>, ClientError>;

    async fn publish_version(
        &self,
        name: &str,
        version: &str,
        config_vars: &[u8],
    ) -> Result<Vec<u8>, ClientError>;

    /// Resolve a selector to a concrete version id.
    async fn resolve_version(
        &self,
        name: &str,
        selector: VersionSelector,
    ) -> Result<String, ClientError>;

    async fn list_test_cases(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Vec<TestCaseSummary>, ClientError>;

    async fn execute_test_case(
        &self,
        name: &str,
        version: &str,
        test_case_id: &str,
        input: &str,
    ) -> Result<Vec<u8>, ClientError>;
}

/// Destination for the pipeline result file written after a successful publish.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn write_result(&self, path: &str, status: &str) -> Result<(), ClientError>;
}

/// One reference per capability, handed to the pipeline for a single run.
#[derive(Clone, Copy)]
pub struct Clients<'a> {
    pub auth_configs: &'a dyn AuthConfigApi,
    pub endpoints: &'a dyn EndpointApi,
    pub zones: &'a dyn ManagedZoneApi,
    pub connections: &'a dyn ConnectionApi,
    pub custom_connectors: &'a dyn CustomConnectorApi,
    pub sfdc: &'a dyn SfdcApi,
    pub integrations: &'a dyn IntegrationApi,
    pub results: &'a dyn ResultSink,
}

impl<'a> Clients<'a> {
    /// Use a single client for every capability.
    pub fn from_client<C>(client: &'a C) -> Self
    where
        C: AuthConfigApi
            + EndpointApi
            + ManagedZoneApi
            + ConnectionApi
            + CustomConnectorApi
            + SfdcApi
            + IntegrationApi
            + ResultSink,
    {
        Clients {
            auth_configs: client,
            endpoints: client,
            zones: client,
            connections: client,
            custom_connectors: client,
            sfdc: client,
            integrations: client,
            results: client,
        }
    }
}
