//! Debugger artifacts: automation scripts and the equivalent manual procedure.
//!
//! Everything here is text generation only. Running a script is the job of
//! [`ExternalTools`](crate::tools::ExternalTools).

use std::path::Path;

/// Printed ahead of the steps of patches that disable request validation.
pub const SECURITY_WARNING: &str = "SECURITY RISK: this patch disables a request validation \
check. Only use the patched client in a controlled environment, such as a friends-only \
revival behind a launcher that adds its own checks.";

/// How the operator finds the spot to patch in the debugger's string search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Search {
    Literal(&'static str),
    /// Requires enabling RegEx in the search window.
    Regex(&'static str),
}

/// A manual debugger procedure. Rendered by [`Procedure::steps`] as eight
/// numbered instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Procedure {
    pub search: Search,
    /// Visit every search hit instead of only the first one.
    pub every_result: bool,
    /// What to change once at a hit.
    pub edit: &'static str,
}

impl Procedure {
    pub fn steps(&self, target: &Path) -> Vec<String> {
        let search = match self.search {
            Search::Literal(text) => format!("Search for: \"{text}\""),
            Search::Regex(pattern) => format!("Enable RegEx and search for: \"{pattern}\""),
        };
        let visit = if self.every_result {
            "Double click on each result"
        } else {
            "Double click on the first result"
        };

        [
            "Open x64dbg and select x32dbg mode".to_owned(),
            format!("Drag your client ({}) into the window", target.display()),
            "Go to Symbols, and double click on your client file".to_owned(),
            "Click the [Az] icon in the top right corner to open string search".to_owned(),
            search,
            visit.to_owned(),
            self.edit.to_owned(),
            "Press Ctrl+P and select 'Patch file'".to_owned(),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {step}", i + 1))
        .collect()
    }
}

/// Script patching the first conditional jumps after a single string reference.
///
/// Used for checks that are referenced from exactly one place.
pub fn first_hit_script(target: &Path, needle: &str) -> String {
    let target = target.display();
    format!(
        "// x32dbg script: {needle}
InitDebug \"{target}\"
findstr \"{needle}\"
findcmd je
setcmd $RESULT jmp
StepOver
findcmd jne
setcmd $RESULT jmp
SaveFile \"{target}\"
StopDebug
exit
"
    )
}

/// Script patching the `je` preceding every reference to each of `needles`.
pub fn every_hit_script(target: &Path, needles: &[&str]) -> String {
    let target = target.display();
    let mut script = format!("// x32dbg script\nInitDebug \"{target}\"\n");

    for needle in needles {
        script.push_str(&format!(
            "
// {needle}
findstr \"{needle}\"
findall
jmp $RESULT
for i $RESULT_COUNT
    goto $_RESULT[i]
    findcmd je -10
    setcmd $RESULT jmp
endfor
"
        ));
    }

    script.push_str(&format!("\nSaveFile \"{target}\"\nStopDebug\nexit\n"));
    script
}
