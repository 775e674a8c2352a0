//! Swaps the embedded public key blobs for a freshly generated key.

use std::fs;

use crate::{
    backup::ensure_backup,
    config::ToolKind,
    disk::write_atomic,
    edit::{find_blobs, replace_blobs, BlobPattern},
    error::{EditError, PatchError, ToolError, ValidationError},
};

use super::{validate_common, Applicability, Applied, Patch, PatchContext, PatchDescriptor, PatchKind};

pub static DESCRIPTOR: PatchDescriptor = PatchDescriptor {
    kind: PatchKind::PublicKey,
    name: "public key",
    summary: "Replaces the client's embedded public keys with one generated by the key generator",
    required_tools: &[ToolKind::KeyGenerator],
    security_risk: false,
    applicability: Applicability::Always,
};

/// Fills the tail of blobs longer than the generated key.
const PAD_BYTE: u8 = 0;

pub struct PublicKey;

impl Patch for PublicKey {
    fn kind(&self) -> PatchKind {
        PatchKind::PublicKey
    }

    fn validate(&self, ctx: &PatchContext<'_>) -> Result<(), ValidationError> {
        validate_common(PatchKind::PublicKey, ctx)
    }

    fn execute(&self, ctx: &PatchContext<'_>) -> Result<Applied, PatchError> {
        let target = ctx.target();
        let bytes = fs::read(target).map_err(|e| PatchError::io(target, e))?;

        // Don't run the generator for a client without key blobs
        if find_blobs(&bytes, BlobPattern::KEY_BLOB).next().is_none() {
            return Err(EditError::PatternNotFound.into());
        }

        let tool_dir = ctx
            .config
            .tool_path(ToolKind::KeyGenerator)
            .ok_or(ToolError::NotConfigured(ToolKind::KeyGenerator))?;
        let keys = ctx.tools.generate_key_pair(tool_dir)?;

        let rewrite = replace_blobs(&bytes, BlobPattern::KEY_BLOB, &keys.public_key, PAD_BYTE)?;
        if rewrite.truncated {
            log::warn!(
                "Generated public key ({} bytes) is longer than some key blobs in {} and was truncated",
                keys.public_key.len(),
                target.display()
            );
        }

        ensure_backup(target)?;
        write_atomic(target, &rewrite.bytes).map_err(|e| PatchError::io(target, e))?;

        let mut details = format!("replaced {} key blobs", rewrite.spans.len());
        if !keys.private_key_files.is_empty() {
            let files: Vec<_> = keys
                .private_key_files
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            details.push_str(&format!(", private key at {}", files.join(", ")));
        }

        log::info!("Public key patch: {details}");
        Ok(Applied::Modified { details })
    }
}
