use std::{error::Error, fs};

use revival_patcher::{
    backup,
    config::{ClientRole, PatchConfig, ToolKind},
    detect::BuildVariant,
    edit::{count_occurrences, find_blobs, BlobPattern},
    error::{EditError, PatchError, SettingsError},
    patch::{Applied, PatchContext, PatchKind},
    settings::{APP_SETTINGS_FILE, CLIENT_APP_SETTINGS_FILE, CLIENT_SETTINGS_DIR},
    tools::ExternalTools,
};
use tempfile::TempDir;

mod common;
use common::{DebuggerBehavior, FakeTools};

fn context<'a>(
    config: &'a PatchConfig,
    tools: &'a dyn ExternalTools,
    variant: BuildVariant,
) -> PatchContext<'a> {
    PatchContext {
        config,
        metadata: config.metadata(Some(variant)),
        build_version: None,
        tools,
    }
}

#[test]
fn website_rejects_bad_domain_without_writing() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let dir = TempDir::new()?;
    let mut config = common::setup(dir.path(), &common::client_bytes(false));
    config.target_domain = "short.io".into();

    let target = config.target_binary_path.clone();
    let before = fs::read(&target)?;
    let modified = fs::metadata(&target)?.modified()?;

    let tools = FakeTools::new(DebuggerBehavior::NoChange);
    let ctx = context(&config, &tools, BuildVariant::Early);
    let patch = PatchKind::Website.operation();

    assert!(patch.validate(&ctx).is_err());
    assert!(matches!(patch.apply(&ctx), Err(PatchError::Invalid(_))));

    assert_eq!(fs::read(&target)?, before);
    assert_eq!(fs::metadata(&target)?.modified()?, modified);
    assert!(!backup::has_backup(&target));
    assert!(!target.with_file_name(APP_SETTINGS_FILE).exists());
    Ok(())
}

#[test]
fn website_rewrites_host_and_settings() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let dir = TempDir::new()?;
    let original = common::client_bytes(false);
    let config = common::setup(dir.path(), &original);
    let target = config.target_binary_path.clone();

    let tools = FakeTools::new(DebuggerBehavior::NoChange);
    let ctx = context(&config, &tools, BuildVariant::Early);
    let patch = PatchKind::Website.operation();

    assert!(matches!(patch.apply(&ctx)?, Applied::Modified { .. }));

    let patched = fs::read(&target)?;
    assert_eq!(patched.len(), original.len());
    assert_eq!(count_occurrences(&patched, b"revive.net"), 2);
    assert_eq!(count_occurrences(&patched, b"roblox.com"), 0);
    assert_eq!(fs::read(backup::backup_path(&target))?, original);

    let settings = fs::read_to_string(target.with_file_name(APP_SETTINGS_FILE))?;
    assert!(settings.contains("<BaseUrl>http://www.revive.net</BaseUrl>"));
    assert!(!target
        .with_file_name(CLIENT_SETTINGS_DIR)
        .join(CLIENT_APP_SETTINGS_FILE)
        .exists());

    // Nothing left to replace on a second run
    assert!(matches!(
        patch.apply(&ctx),
        Err(PatchError::Edit(EditError::PatternNotFound))
    ));
    assert_eq!(fs::read(&target)?, patched);
    Ok(())
}

#[test]
fn website_updates_flag_map_of_late_builds() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let dir = TempDir::new()?;
    let config = common::setup(dir.path(), &common::client_bytes(true));
    let flags_path = config
        .target_binary_path
        .with_file_name(CLIENT_SETTINGS_DIR)
        .join(CLIENT_APP_SETTINGS_FILE);
    fs::create_dir_all(flags_path.parent().unwrap())?;
    fs::write(&flags_path, r#"{"FFlagDisableRunService": "True"}"#)?;

    let tools = FakeTools::new(DebuggerBehavior::NoChange);
    let ctx = context(&config, &tools, BuildVariant::Late);
    PatchKind::Website.operation().apply(&ctx)?;

    let flags = fs::read_to_string(&flags_path)?;
    assert!(flags.contains(r#""FStringCookieDomain": "revive.net""#));
    assert!(flags.contains(r#""FFlagDisableRunService": "True""#));
    Ok(())
}

#[test]
fn website_with_malformed_settings_leaves_client_untouched() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let dir = TempDir::new()?;
    let original = common::client_bytes(false);
    let config = common::setup(dir.path(), &original);
    let target = config.target_binary_path.clone();
    let app_settings = target.with_file_name(APP_SETTINGS_FILE);
    fs::write(&app_settings, "<Config/>")?;

    let tools = FakeTools::new(DebuggerBehavior::NoChange);
    let ctx = context(&config, &tools, BuildVariant::Early);
    let result = PatchKind::Website.operation().apply(&ctx);

    assert!(matches!(
        result,
        Err(PatchError::Settings(SettingsError::Malformed { .. }))
    ));
    assert_eq!(fs::read(&target)?, original);
    assert!(!backup::has_backup(&target));
    assert_eq!(fs::read_to_string(&app_settings)?, "<Config/>");
    Ok(())
}

#[test]
fn website_with_malformed_flag_map_leaves_client_untouched() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let dir = TempDir::new()?;
    let original = common::client_bytes(true);
    let config = common::setup(dir.path(), &original);
    let target = config.target_binary_path.clone();
    let flags_path = target
        .with_file_name(CLIENT_SETTINGS_DIR)
        .join(CLIENT_APP_SETTINGS_FILE);
    fs::create_dir_all(flags_path.parent().unwrap())?;
    fs::write(&flags_path, "[\"not\", \"a map\"]")?;

    let tools = FakeTools::new(DebuggerBehavior::NoChange);
    let ctx = context(&config, &tools, BuildVariant::Late);
    let result = PatchKind::Website.operation().apply(&ctx);

    assert!(matches!(
        result,
        Err(PatchError::Settings(SettingsError::NotAFlagMap(_)))
    ));
    assert_eq!(fs::read(&target)?, original);
    assert!(!target.with_file_name(APP_SETTINGS_FILE).exists());
    Ok(())
}

#[test]
fn public_key_replaces_every_blob() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let dir = TempDir::new()?;
    let original = common::client_bytes(false);
    let config = common::setup(dir.path(), &original);
    let target = config.target_binary_path.clone();

    let tools = FakeTools::new(DebuggerBehavior::NoChange);
    let ctx = context(&config, &tools, BuildVariant::Early);

    let Applied::Modified { details } = PatchKind::PublicKey.operation().apply(&ctx)? else {
        panic!("expected a modification");
    };
    assert!(details.contains("replaced 2 key blobs"));
    assert_eq!(*tools.key_runs.borrow(), 1);

    let patched = fs::read(&target)?;
    assert_eq!(patched.len(), original.len());
    assert_eq!(count_occurrences(&patched, common::ORIGINAL_BLOB), 0);
    assert_eq!(count_occurrences(&patched, b"BgIAAnewkey\0"), 2);

    let blobs: Vec<_> = find_blobs(&patched, BlobPattern::KEY_BLOB).collect();
    assert_eq!(blobs.len(), 2);
    assert!(blobs.iter().all(|span| &patched[span.clone()] == b"BgIAAnewkey"));
    Ok(())
}

#[test]
fn public_key_without_blobs_skips_generator() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let dir = TempDir::new()?;
    let config = common::setup(dir.path(), b"MZ no keys in here");

    let tools = FakeTools::new(DebuggerBehavior::NoChange);
    let ctx = context(&config, &tools, BuildVariant::Early);

    let result = PatchKind::PublicKey.operation().apply(&ctx);
    assert!(matches!(result, Err(PatchError::Edit(EditError::PatternNotFound))));
    assert_eq!(*tools.key_runs.borrow(), 0);
    assert!(!backup::has_backup(&config.target_binary_path));
    Ok(())
}

#[test]
fn tools_must_be_configured_and_present() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let dir = TempDir::new()?;
    let mut config = common::setup(dir.path(), &common::client_bytes(false));
    let tools = FakeTools::new(DebuggerBehavior::NoChange);

    config.set_tool_path(ToolKind::KeyGenerator, None);
    let ctx = context(&config, &tools, BuildVariant::Early);
    let err = PatchKind::PublicKey.operation().validate(&ctx).unwrap_err();
    assert!(err.reason.contains("not configured"));

    config.set_tool_path(ToolKind::Debugger, Some(dir.path().join("missing.exe")));
    let ctx = context(&config, &tools, BuildVariant::Early);
    let err = PatchKind::Blocking.operation().validate(&ctx).unwrap_err();
    assert!(err.reason.contains("not found"));
    Ok(())
}

#[test]
fn check_patch_hands_out_instructions() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let dir = TempDir::new()?;
    let original = common::client_bytes(false);
    let config = common::setup(dir.path(), &original);
    let target = config.target_binary_path.clone();

    let tools = FakeTools::new(DebuggerBehavior::Fail);
    let ctx = context(&config, &tools, BuildVariant::Early);

    let Applied::Delegated { instructions } = PatchKind::TrustCheck.operation().apply(&ctx)? else {
        panic!("expected delegated outcome");
    };
    assert!(instructions[0].starts_with("SECURITY RISK"));
    assert!(instructions
        .iter()
        .any(|l| l == "5. Search for: \"trust check failed for %s\""));

    // Automation is off, so the debugger never ran
    assert!(tools.scripts.borrow().is_empty());
    assert!(backup::has_backup(&target));
    assert_eq!(fs::read(&target)?, original);
    Ok(())
}

#[test]
fn automated_debugger_failure_is_reported() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let dir = TempDir::new()?;
    let mut config = common::setup(dir.path(), &common::client_bytes(false));
    config.automate_debugger = true;

    let tools = FakeTools::new(DebuggerBehavior::Fail);
    let ctx = context(&config, &tools, BuildVariant::Early);

    let result = PatchKind::Blocking.operation().apply(&ctx);
    assert!(matches!(result, Err(PatchError::Tool(_))));
    assert_eq!(tools.scripts.borrow().len(), 1);
    assert!(backup::has_backup(&config.target_binary_path));
    Ok(())
}

#[test]
fn automated_debugger_result_depends_on_file_change() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let dir = TempDir::new()?;
    let mut config = common::setup(dir.path(), &common::client_bytes(false));
    config.automate_debugger = true;

    let unchanged = FakeTools::new(DebuggerBehavior::NoChange);
    let ctx = context(&config, &unchanged, BuildVariant::Early);
    assert!(matches!(
        PatchKind::Blocking.operation().apply(&ctx)?,
        Applied::Delegated { .. }
    ));

    let patching = FakeTools::new(DebuggerBehavior::Rewrite(b"blocking %s", b"BLOCKING %s"));
    let ctx = context(&config, &patching, BuildVariant::Early);
    assert!(matches!(
        PatchKind::Blocking.operation().apply(&ctx)?,
        Applied::Modified { .. }
    ));

    let scripts = patching.scripts.borrow();
    let script = &scripts[0];
    assert!(script.contains("findstr \"blocking %s\""));
    assert!(script.contains(&format!(
        "SaveFile \"{}\"",
        config.target_binary_path.display()
    )));
    Ok(())
}

#[test]
fn ratnet_key_names_replacement_for_known_build() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let dir = TempDir::new()?;
    let mut config = common::setup(dir.path(), &common::client_bytes(false));
    let tools = FakeTools::new(DebuggerBehavior::NoChange);
    let patch = PatchKind::RatnetKey.operation();

    let ctx = context(&config, &tools, BuildVariant::Early);
    let err = patch.validate(&ctx).unwrap_err();
    assert!(err.reason.contains("service host"));

    config.client_role = ClientRole::ServiceHost;
    let ctx = PatchContext {
        build_version: Some("0.285.0.49012"),
        ..context(&config, &tools, BuildVariant::Early)
    };
    let Applied::Delegated { instructions } = patch.apply(&ctx)? else {
        panic!("expected delegated outcome");
    };
    assert_eq!(
        instructions[0],
        "Replacement key for build 0.285.0.49012: 1ro78912031q78334p81s417q586ss732s4qr2n4"
    );
    assert_eq!(instructions.len(), 9);
    Ok(())
}

#[test]
fn html_service_is_limited_to_2008() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let dir = TempDir::new()?;
    let mut config = common::setup(dir.path(), &common::client_bytes(false));
    let tools = FakeTools::new(DebuggerBehavior::NoChange);
    let patch = PatchKind::HtmlService.operation();

    assert!(patch
        .validate(&context(&config, &tools, BuildVariant::Early))
        .is_err());

    config.release_year = 2008;
    let applied = patch.apply(&context(&config, &tools, BuildVariant::Early))?;
    assert!(matches!(applied, Applied::Delegated { ref instructions } if instructions.len() == 8));
    Ok(())
}
