pub mod apply;
pub mod cli;
pub mod client;
pub mod code_inline;
pub mod config;
pub mod contract;
pub mod error;
pub mod kinds;
pub mod load_config;
pub mod locate;
pub mod publish;
pub mod reconcile;
pub mod testcases;

pub use apply::{apply, ApplyReport};
pub use cli::{run, Cli, Commands};
pub use config::{ApplyConfig, FileSplitter, PipelineRun};
pub use error::ApplyError;
