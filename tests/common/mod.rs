#![allow(dead_code)]

use std::{
    cell::RefCell,
    fs,
    path::{Path, PathBuf},
};

use revival_patcher::{
    config::{PatchConfig, ToolKind},
    edit::replace_fixed_length,
    error::ToolError,
    tools::{read_key_pair, ExternalTools, KeyPair, KEY_GENERATOR_EXE, PUBLIC_KEY_FILE},
};
use simplelog::*;

pub const ORIGINAL_BLOB: &[u8] = b"BgIAAACkAABSU0ExAAQAAAEAAQ==";

pub fn init_logging() {
    // Several tests share one process; only the first init succeeds.
    let _ = TermLogger::init(
        LevelFilter::Debug,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

/// A fake client: two host name references, two key blobs and, for late
/// builds, the launcher markers.
pub fn client_bytes(late: bool) -> Vec<u8> {
    let mut bytes = b"MZ\x90\x00fake client\x00http://www.roblox.com/Game/Join.ashx\x00".to_vec();
    bytes.extend_from_slice(ORIGINAL_BLOB);
    bytes.extend_from_slice(b"\x00\x00api.roblox.com\x00blocking %s\x00");
    bytes.extend_from_slice(ORIGINAL_BLOB);
    bytes.push(0);
    if late {
        bytes.extend_from_slice(b"GameLauncher\x00HttpRbxApiService\x00");
    }
    bytes
}

/// Lays out a client and both tools under `root` and returns a config using
/// them.
pub fn setup(root: &Path, client: &[u8]) -> PatchConfig {
    let client_dir = root.join("client");
    let tool_dir = root.join("tools");
    fs::create_dir_all(&client_dir).unwrap();
    fs::create_dir_all(&tool_dir).unwrap();

    let target = client_dir.join("Client.exe");
    fs::write(&target, client).unwrap();
    fs::write(tool_dir.join(KEY_GENERATOR_EXE), b"").unwrap();
    fs::write(tool_dir.join("x32dbg.exe"), b"").unwrap();

    let mut config = PatchConfig {
        target_binary_path: target,
        target_domain: "revive.net".into(),
        ..Default::default()
    };
    config.set_tool_path(ToolKind::KeyGenerator, Some(tool_dir.clone()));
    config.set_tool_path(ToolKind::Debugger, Some(tool_dir.join("x32dbg.exe")));
    config
}

#[derive(Debug, Clone)]
pub enum DebuggerBehavior {
    Fail,
    NoChange,
    /// Rewrites these bytes in the file named by the script's `SaveFile`.
    Rewrite(&'static [u8], &'static [u8]),
}

pub struct FakeTools {
    pub public_key: Vec<u8>,
    pub debugger: DebuggerBehavior,
    pub scripts: RefCell<Vec<String>>,
    pub key_runs: RefCell<usize>,
}

impl FakeTools {
    pub fn new(debugger: DebuggerBehavior) -> Self {
        Self {
            public_key: b"BgIAAnewkey".to_vec(),
            debugger,
            scripts: RefCell::new(Vec::new()),
            key_runs: RefCell::new(0),
        }
    }
}

impl ExternalTools for FakeTools {
    fn generate_key_pair(&self, tool_dir: &Path) -> Result<KeyPair, ToolError> {
        *self.key_runs.borrow_mut() += 1;

        let mut blob = self.public_key.clone();
        blob.extend_from_slice(b"\r\n");
        fs::write(tool_dir.join(PUBLIC_KEY_FILE), blob).map_err(|source| ToolError::Io {
            path: tool_dir.to_owned(),
            source,
        })?;
        read_key_pair(tool_dir)
    }

    fn run_debugger_script(&self, debugger: &Path, script: &Path) -> Result<(), ToolError> {
        let text = fs::read_to_string(script).map_err(|source| ToolError::Io {
            path: script.to_owned(),
            source,
        })?;
        self.scripts.borrow_mut().push(text.clone());

        match self.debugger {
            DebuggerBehavior::Fail => Err(ToolError::ExitStatus {
                program: debugger.to_owned(),
                status: "exit code: 1".into(),
                stderr: "script error".into(),
            }),
            DebuggerBehavior::NoChange => Ok(()),
            DebuggerBehavior::Rewrite(from, to) => {
                let target = saved_file(&text).ok_or(ToolError::MissingOutput(script.to_owned()))?;
                let bytes = fs::read(&target).map_err(|source| ToolError::Io {
                    path: target.clone(),
                    source,
                })?;
                let patched = replace_fixed_length(&bytes, from, to)
                    .map_err(|_| ToolError::MissingOutput(target.clone()))?;
                fs::write(&target, patched).map_err(|source| ToolError::Io {
                    path: target.clone(),
                    source,
                })
            }
        }
    }
}

fn saved_file(script: &str) -> Option<PathBuf> {
    script
        .lines()
        .find_map(|l| l.strip_prefix("SaveFile \""))
        .and_then(|rest| rest.strip_suffix('"'))
        .map(PathBuf::from)
}
