#![forbid(unsafe_code)]

pub mod backup;
pub mod config;
pub mod detect;
pub mod disk;
pub mod edit;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod patch;
pub mod script;
pub mod settings;
pub mod tools;

pub use config::{ClientMetadata, ClientRole, PatchConfig, ToolKind};
pub use orchestrator::{Orchestrator, PatchOutcome, PatchStatus, RunReport};
pub use patch::{Applied, Patch, PatchKind};
pub use tools::{ExternalTools, ProcessTools};
