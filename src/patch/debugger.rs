use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    backup::ensure_backup,
    config::ToolKind,
    disk::write_atomic,
    error::{PatchError, ToolError},
};

use super::{Applied, PatchContext};

/// `Client.exe` -> `Client.exe.x32dbg.txt`.
pub(crate) fn script_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".x32dbg.txt");
    PathBuf::from(name)
}

/// Common tail of every debugger-driven patch.
///
/// Backs the target up, then runs `script` through the debugger when automation
/// is enabled. Falls back to handing out `instructions` when there is no
/// script, automation is off, or the script ran but left the target unchanged.
pub(crate) fn delegate(
    ctx: &PatchContext<'_>,
    script: Option<String>,
    instructions: Vec<String>,
) -> Result<Applied, PatchError> {
    let target = ctx.target();
    ensure_backup(target)?;

    let script = match script {
        Some(script) if ctx.config.automate_debugger => script,
        _ => return Ok(Applied::Delegated { instructions }),
    };

    let debugger = ctx
        .config
        .tool_path(ToolKind::Debugger)
        .ok_or(ToolError::NotConfigured(ToolKind::Debugger))?;

    let script_file = script_path(target);
    write_atomic(&script_file, script.as_bytes()).map_err(|e| PatchError::io(&script_file, e))?;

    let before = fs::read(target).map_err(|e| PatchError::io(target, e))?;
    ctx.tools.run_debugger_script(debugger, &script_file)?;
    let after = fs::read(target).map_err(|e| PatchError::io(target, e))?;

    if before == after {
        log::warn!(
            "Debugger script finished without changing {}, manual steps required",
            target.display()
        );
        return Ok(Applied::Delegated { instructions });
    }

    let changed = before
        .iter()
        .zip(&after)
        .filter(|(a, b)| a != b)
        .count()
        + before.len().abs_diff(after.len());

    Ok(Applied::Modified {
        details: format!(
            "debugger script {} changed {changed} bytes",
            script_file.display()
        ),
    })
}
