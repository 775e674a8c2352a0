//! Redirects the client to a custom domain.

use std::{fs, path::Path};

use crate::{
    backup::ensure_backup,
    detect::BuildVariant,
    disk::write_atomic,
    edit::{count_occurrences, replace_fixed_length},
    error::{PatchError, ValidationError},
    settings,
};

use super::{validate_common, Applicability, Applied, Patch, PatchContext, PatchDescriptor, PatchKind};

/// Host name compiled into every client. Replacement domains must have the
/// same length.
pub const HOST_TOKEN: &[u8] = b"roblox.com";

pub static DESCRIPTOR: PatchDescriptor = PatchDescriptor {
    kind: PatchKind::Website,
    name: "website",
    summary: "Replaces the built-in host name with your domain and points AppSettings.xml at it",
    required_tools: &[],
    security_risk: false,
    applicability: Applicability::Always,
};

pub struct Website;

impl Patch for Website {
    fn kind(&self) -> PatchKind {
        PatchKind::Website
    }

    fn validate(&self, ctx: &PatchContext<'_>) -> Result<(), ValidationError> {
        validate_common(PatchKind::Website, ctx)?;

        let domain = &ctx.config.target_domain;
        if !domain.is_ascii() || domain.len() != HOST_TOKEN.len() {
            return Err(ValidationError::new(format!(
                "domain '{domain}' must be exactly {} ASCII characters, got {}",
                HOST_TOKEN.len(),
                domain.chars().count()
            )));
        }
        Ok(())
    }

    fn execute(&self, ctx: &PatchContext<'_>) -> Result<Applied, PatchError> {
        let target = ctx.target();
        let domain = ctx.config.target_domain.as_str();

        let bytes = fs::read(target).map_err(|e| PatchError::io(target, e))?;
        let patched = replace_fixed_length(&bytes, HOST_TOKEN, domain.as_bytes())?;
        let count = count_occurrences(&bytes, HOST_TOKEN);

        let client_dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut updates = vec![settings::app_settings_update(client_dir, domain)?];
        if ctx.variant() == BuildVariant::Late {
            updates.push(settings::client_app_settings_update(client_dir, domain)?);
        }

        ensure_backup(target)?;
        write_atomic(target, &patched).map_err(|e| PatchError::io(target, e))?;
        log::info!("Replaced {count} host name occurrences in {}", target.display());

        let mut details = format!(
            "replaced {count} occurrences of {} with {domain}",
            String::from_utf8_lossy(HOST_TOKEN)
        );
        // The binary is patched from here on; sidecar errors are reported, not raised
        for update in &updates {
            match update.write() {
                Ok(path) => details.push_str(&format!(", updated {}", path.display())),
                Err(e) => {
                    log::warn!("Client patched but settings were not written: {e}");
                    details.push_str(&format!(", failed to update {}: {e}", update.path().display()));
                }
            }
        }

        Ok(Applied::Modified { details })
    }
}
