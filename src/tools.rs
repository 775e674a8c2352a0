//! External programs the patches depend on.
//!
//! Patches never spawn processes themselves; they go through [`ExternalTools`],
//! which [`ProcessTools`] implements by running the real programs. Any other
//! implementation (a test double, a remote runner) can be handed to the
//! [`Orchestrator`](crate::orchestrator::Orchestrator) instead.

use std::{
    fs, io,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use crate::error::ToolError;

/// Executable expected inside the configured key generator directory.
pub const KEY_GENERATOR_EXE: &str = "KeyGenerator.exe";
/// Base64 public key blob written by the key generator.
pub const PUBLIC_KEY_FILE: &str = "PublicKeyBlob.txt";
pub const PRIVATE_KEY_FILE: &str = "PrivateKeyBlob.txt";
pub const PRIVATE_KEY_PEM: &str = "PrivateKey.pem";

/// Output of a key generator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// Public key blob, surrounding whitespace removed.
    pub public_key: Vec<u8>,
    /// Private key files the generator left behind. The server side needs them.
    pub private_key_files: Vec<PathBuf>,
}

pub trait ExternalTools {
    /// Runs the key generator living in `tool_dir` and returns the pair it wrote.
    fn generate_key_pair(&self, tool_dir: &Path) -> Result<KeyPair, ToolError>;

    /// Runs `script` through the debugger at `debugger`, blocking until it exits.
    ///
    /// Success only means the debugger reported success. Callers must inspect
    /// the target themselves to learn whether anything changed.
    fn run_debugger_script(&self, debugger: &Path, script: &Path) -> Result<(), ToolError>;
}

/// [`ExternalTools`] backed by child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessTools;

impl ExternalTools for ProcessTools {
    fn generate_key_pair(&self, tool_dir: &Path) -> Result<KeyPair, ToolError> {
        let exe = tool_dir.join(KEY_GENERATOR_EXE);
        if !exe.is_file() {
            return Err(ToolError::Missing(exe));
        }

        log::info!("Generating key pair with {}", exe.display());
        let output = Command::new(&exe).current_dir(tool_dir).output();
        check_output(&exe, output)?;

        read_key_pair(tool_dir)
    }

    fn run_debugger_script(&self, debugger: &Path, script: &Path) -> Result<(), ToolError> {
        if !debugger.is_file() {
            return Err(ToolError::Missing(debugger.to_owned()));
        }

        log::info!("Running debugger script {}", script.display());
        let output = Command::new(debugger)
            .arg("-scriptrun")
            .arg(script)
            .output();
        check_output(debugger, output)?;

        log::info!("Debugger script completed");
        Ok(())
    }
}

fn check_output(program: &Path, output: io::Result<Output>) -> Result<(), ToolError> {
    let output = output.map_err(|source| ToolError::Spawn {
        program: program.to_owned(),
        source,
    })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(ToolError::ExitStatus {
            program: program.to_owned(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

/// Collects the files a key generator run leaves in `tool_dir`.
///
/// The public key blob is mandatory; private key files are listed when present.
pub fn read_key_pair(tool_dir: &Path) -> Result<KeyPair, ToolError> {
    let public_path = tool_dir.join(PUBLIC_KEY_FILE);
    let public_key = match fs::read(&public_path) {
        Ok(bytes) => bytes.trim_ascii().to_vec(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ToolError::MissingOutput(public_path))
        }
        Err(source) => {
            return Err(ToolError::Io {
                path: public_path,
                source,
            })
        }
    };

    if public_key.is_empty() {
        return Err(ToolError::MissingOutput(public_path));
    }

    let private_key_files = [PRIVATE_KEY_FILE, PRIVATE_KEY_PEM]
        .into_iter()
        .map(|name| tool_dir.join(name))
        .filter(|p| p.is_file())
        .collect();

    Ok(KeyPair {
        public_key,
        private_key_files,
    })
}
