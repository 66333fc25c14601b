use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::{Args, Parser, Subcommand};

use crate::apply::apply;
use crate::client::PlatformClient;
use crate::config::{ApplyConfig, FileSplitter};
use crate::contract::{Clients, ManagedZoneApi};
use crate::load_config::{load_settings, ClientSettings, SettingsOverrides};
use crate::testcases::{create_test_case, execute_test_cases, ExecuteRequest};

/// CLI for integration-apply: apply scaffolded integration resources to a project.
#[derive(Parser)]
#[clap(
    name = "integration-apply",
    version,
    about = "Apply scaffolded auth configs, connectors, SFDC resources and integration flows to a project and region"
)]
pub struct Cli {
    #[clap(flatten)]
    pub connection: ConnectionArgs,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Where to apply. Each value falls back to the environment, then to the profile.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Project id
    #[clap(long = "proj", short = 'p', global = true)]
    pub project: Option<String>,

    /// Region (location) of the integration platform
    #[clap(long = "reg", short = 'r', global = true)]
    pub region: Option<String>,

    /// Access token
    #[clap(long, short = 't', global = true)]
    pub token: Option<String>,

    /// Path to a YAML profile with project, region and endpoint overrides
    #[clap(long, global = true)]
    pub profile: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create every scaffolded resource that does not exist yet, then version and publish the integration
    Apply(ApplyArgs),

    /// Create or execute integration test cases
    TestCases {
        #[clap(subcommand)]
        command: TestCaseCommands,
    },

    /// Manage connector managed zones
    Zones {
        #[clap(subcommand)]
        command: ZoneCommands,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    /// Root folder of the scaffolded configuration
    #[clap(long, short = 'f')]
    pub folder: PathBuf,

    /// Environment sub-folder holding per-environment resources
    #[clap(long, short = 'e')]
    pub env: Option<String>,

    /// User label for the new integration version
    #[clap(long = "userlabel", short = 'u')]
    pub user_label: Option<String>,

    /// Service account used by connections
    #[clap(long = "sa")]
    pub service_account: Option<String>,

    /// Project of the service account, defaults to the target project
    #[clap(long = "sp")]
    pub service_account_project: Option<String>,

    /// Cloud KMS key id for encrypted connection secrets
    #[clap(long = "encryption-keyid", short = 'k')]
    pub encryption_key: Option<String>,

    /// Grant the service account the permissions it needs
    #[clap(long = "grant-permission", short = 'g')]
    pub grant_permission: bool,

    /// Create secrets referenced by connections
    #[clap(long = "create-secret")]
    pub create_secret: bool,

    /// Wait for long-running creates to finish
    #[clap(long)]
    pub wait: bool,

    #[clap(long = "skip-connectors")]
    pub skip_connectors: bool,

    #[clap(long = "skip-authconfigs")]
    pub skip_authconfigs: bool,

    /// Split two-part file names on `_` instead of `__`
    #[clap(long = "use-underscore")]
    pub use_underscore: bool,

    /// Release pipeline name
    #[clap(long)]
    pub pipeline: Option<String>,

    /// Release name
    #[clap(long)]
    pub release: Option<String>,

    /// Where to write the result file (`gs://bucket/prefix` or a local folder)
    #[clap(long = "output-gcs-path")]
    pub output_gcs_path: Option<String>,
}

impl ApplyArgs {
    /// Build and validate the run configuration; no remote call happens here.
    pub fn into_config(self) -> Result<ApplyConfig> {
        let pipeline =
            ApplyConfig::pipeline_from_flags(self.pipeline, self.release, self.output_gcs_path)?;
        let config = ApplyConfig {
            folder: self.folder,
            env: self.env,
            user_label: self.user_label,
            service_account: self.service_account,
            service_account_project: self.service_account_project,
            encryption_key: self.encryption_key,
            grant_permission: self.grant_permission,
            create_secret: self.create_secret,
            wait: self.wait,
            skip_authconfigs: self.skip_authconfigs,
            skip_connectors: self.skip_connectors,
            splitter: FileSplitter::from_use_underscore(self.use_underscore),
            pipeline,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum TestCaseCommands {
    /// Attach a test case to an integration version
    Create {
        /// Integration name
        #[clap(long, short = 'n')]
        name: String,

        /// Integration version id
        #[clap(long = "ver", short = 'v')]
        version: String,

        /// Path to the test case definition
        #[clap(long = "test-case-path", short = 'c')]
        test_case_path: PathBuf,
    },

    /// Execute test cases against an integration version
    Execute {
        /// Integration name
        #[clap(long, short = 'n')]
        name: String,

        /// Integration version id
        #[clap(long = "ver", short = 'v')]
        version: Option<String>,

        /// Resolve the version by user label
        #[clap(long = "user-label", short = 'u')]
        user_label: Option<String>,

        /// Resolve the version by snapshot number
        #[clap(long, short = 's')]
        snapshot: Option<String>,

        /// Test case id, used with --input-file
        #[clap(long = "test-case-id", short = 'c')]
        test_case_id: Option<String>,

        /// Input parameters for a single test case
        #[clap(long = "input-file", short = 'f')]
        input_file: Option<PathBuf>,

        /// Folder of `<test case display name>.json` input files
        #[clap(long = "input-folder", short = 'd')]
        input_folder: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ZoneCommands {
    /// Delete a managed zone
    Delete {
        /// Managed zone name
        #[clap(long, short = 'n')]
        name: String,
    },
}

fn connect(connection: ConnectionArgs) -> Result<PlatformClient> {
    let settings: ClientSettings = load_settings(
        connection.profile.as_deref(),
        SettingsOverrides {
            project: connection.project,
            region: connection.region,
            token: connection.token,
        },
    )?;
    Ok(PlatformClient::new(settings))
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Apply(args) => {
            let config = args.into_config()?;
            let client = connect(cli.connection)?;
            println!("Apply starting...");
            match apply(&config, Clients::from_client(&client)).await {
                Ok(report) => {
                    println!("Apply complete.\nReport:");
                    println!("{:#?}", report);
                    Ok(())
                }
                Err(e) => {
                    eprintln!("[ERROR] Apply failed: {}", e);
                    Err(e.into())
                }
            }
        }
        Commands::TestCases {
            command:
                TestCaseCommands::Create {
                    name,
                    version,
                    test_case_path,
                },
        } => {
            ensure!(
                test_case_path.is_file(),
                "test case file {} does not exist",
                test_case_path.display()
            );
            let client = connect(cli.connection)?;
            let response = create_test_case(&client, &name, &version, &test_case_path).await?;
            println!("{}", String::from_utf8_lossy(&response));
            Ok(())
        }
        Commands::TestCases {
            command:
                TestCaseCommands::Execute {
                    name,
                    version,
                    user_label,
                    snapshot,
                    test_case_id,
                    input_file,
                    input_folder,
                },
        } => {
            let req = ExecuteRequest::from_flags(
                name,
                version,
                user_label,
                snapshot,
                test_case_id,
                input_file,
                input_folder,
            )?;
            let client = connect(cli.connection)?;
            let report = execute_test_cases(&client, &req).await?;
            println!("Test cases executed.\nReport:");
            println!("{:#?}", report);
            Ok(())
        }
        Commands::Zones {
            command: ZoneCommands::Delete { name },
        } => {
            let client = connect(cli.connection)?;
            client
                .delete_zone(&name)
                .await
                .map_err(|e| anyhow::anyhow!("failed to delete managed zone {name}: {e}"))?;
            println!("Managed zone {name} deleted");
            Ok(())
        }
    }
}
