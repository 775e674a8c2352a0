use std::{
    error::Error,
    fs::{self, File},
    path::{Path, PathBuf},
};

use clap::{ArgAction, Args, Parser, Subcommand};
use revival_patcher::{
    backup,
    config::{ClientRole, PatchConfig, ToolKind},
    detect,
    history::{parse_year_range, DeployHistory},
    patch::{available_kinds, recommended_kinds, PatchKind},
    Orchestrator, PatchOutcome, PatchStatus, ProcessTools,
};
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,

    /// More output. Repeat for trace logging
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Also write a debug log to this file
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Patch a client binary
    Patch(PatchArgs),
    /// Restore a client from its backup
    Restore {
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Print the build variant and version of a client
    Detect {
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Select builds from a deployment history log
    History(HistoryArgs),
    /// List the patches available for a client
    Kinds {
        #[arg(long, default_value_t = 2010)]
        year: i32,
        #[arg(long, default_value = "player")]
        role: ClientRole,
    },
}

#[derive(Args)]
struct ClientArgs {
    /// Client executable
    #[arg(long, value_name = "EXE")]
    client: Option<PathBuf>,

    /// Directory to search for the client executable (up to 2 levels deep)
    #[arg(long, value_name = "DIR", conflicts_with = "client")]
    client_dir: Option<PathBuf>,
}

impl ClientArgs {
    fn resolve(&self) -> Result<Option<PathBuf>, Box<dyn Error>> {
        match (&self.client, &self.client_dir) {
            (Some(client), _) => Ok(Some(client.clone())),
            (None, Some(dir)) => find_client_exe(dir).map(Some),
            (None, None) => Ok(None),
        }
    }

    fn require(&self) -> Result<PathBuf, Box<dyn Error>> {
        self.resolve()?
            .ok_or_else(|| "either --client or --client-dir is required".into())
    }
}

#[derive(Args)]
struct PatchArgs {
    /// Load settings from a JSON config. Flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    client: ClientArgs,

    /// Domain to redirect to. Must be exactly 10 characters
    #[arg(long)]
    domain: Option<String>,

    #[arg(long)]
    year: Option<i32>,

    #[arg(long)]
    role: Option<ClientRole>,

    /// Patch to apply. Repeat for several. Defaults to the recommended set
    #[arg(long = "patch", value_name = "KIND")]
    patches: Vec<PatchKind>,

    /// Only run these of the selected patches
    #[arg(long, value_name = "KIND")]
    only: Vec<PatchKind>,

    /// Directory containing KeyGenerator.exe
    #[arg(long, value_name = "DIR")]
    key_generator: Option<PathBuf>,

    /// Debugger executable (x32dbg)
    #[arg(long, value_name = "EXE")]
    debugger: Option<PathBuf>,

    /// Run generated debugger scripts instead of only printing manual steps
    #[arg(long)]
    automate_debugger: bool,

    /// Write the effective configuration to this file
    #[arg(long, value_name = "FILE")]
    save_config: Option<PathBuf>,
}

#[derive(Args)]
#[group(required = true, multiple = false, id = "selection")]
struct HistorySelection {
    #[arg(long)]
    year: Option<i32>,

    /// Inclusive year range, e.g. 2010-2012
    #[arg(long, value_name = "START-END")]
    range: Option<String>,

    /// Explicit version ids. Repeat for several
    #[arg(long = "version", value_name = "ID")]
    versions: Vec<String>,

    /// Count deployments per year
    #[arg(long)]
    list_years: bool,
}

#[derive(Args)]
struct HistoryArgs {
    /// Deployment log to read
    #[arg(long, value_name = "FILE")]
    log: PathBuf,

    #[command(flatten)]
    selection: HistorySelection,

    /// Maximum builds per year
    #[arg(long, default_value_t = 1)]
    max: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();
    init_logging(&args)?;

    match args.command {
        Command::Patch(patch_args) => patch(patch_args),
        Command::Restore { client } => {
            let client = client.require()?;
            backup::restore(&client)?;
            Ok(())
        }
        Command::Detect { client } => {
            let client = client.require()?;
            let probe = detect::probe_file(&client);
            println!("{}: {}", client.display(), probe.variant);
            if let Some(version) = probe.build_version {
                println!("file version {version}");
            }
            Ok(())
        }
        Command::History(history_args) => history(history_args),
        Command::Kinds { year, role } => {
            let meta = PatchConfig {
                release_year: year,
                client_role: role,
                ..Default::default()
            }
            .metadata(None);

            let recommended = recommended_kinds(&meta);
            for kind in available_kinds(&meta) {
                let descriptor = kind.descriptor();
                println!(
                    "{}{:<16} {}",
                    if recommended.contains(&kind) { "* " } else { "  " },
                    kind.to_string(),
                    descriptor.summary
                );
            }
            Ok(())
        }
    }
}

fn init_logging(args: &CliArgs) -> Result<(), Box<dyn Error>> {
    let level = match (args.quiet, args.verbose) {
        (true, _) => LevelFilter::Warn,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Stdout,
        ColorChoice::Auto,
    )];
    if let Some(path) = &args.log_file {
        loggers.push(WriteLogger::new(
            LevelFilter::Debug,
            Config::default(),
            File::create(path)?,
        ));
    }

    CombinedLogger::init(loggers)?;
    Ok(())
}

fn patch(args: PatchArgs) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => PatchConfig::load(path)?,
        None => PatchConfig::default(),
    };

    if let Some(client) = args.client.resolve()? {
        config.target_binary_path = client;
    }
    if let Some(domain) = args.domain {
        config.target_domain = domain;
    }
    if let Some(year) = args.year {
        config.release_year = year;
    }
    if let Some(role) = args.role {
        config.client_role = role;
    }
    if let Some(dir) = args.key_generator {
        config.set_tool_path(ToolKind::KeyGenerator, Some(dir));
    }
    if let Some(exe) = args.debugger {
        config.set_tool_path(ToolKind::Debugger, Some(exe));
    }
    config.automate_debugger |= args.automate_debugger;
    config.selected_patches.extend(args.patches);

    if config.selected_patches.is_empty() {
        let recommended = recommended_kinds(&config.metadata(None));
        log::info!(
            "No patches selected, using the recommended set: {}",
            recommended
                .iter()
                .map(PatchKind::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        config.selected_patches.extend(recommended);
    }

    if let Some(path) = &args.save_config {
        config.save(path)?;
        log::info!("Saved configuration to {}", path.display());
    }

    log::info!("Patching {}", config.target_binary_path.display());

    let tools = ProcessTools;
    let orchestrator = Orchestrator::new(&tools);
    let report = if args.only.is_empty() {
        orchestrator.run_selected(&config, print_outcome)
    } else {
        let kinds = args
            .only
            .into_iter()
            .filter(|k| config.selected_patches.contains(k));
        orchestrator.run(&config, kinds, print_outcome)
    };

    log::info!("{report}");
    match report.failed() {
        0 => Ok(()),
        n => Err(format!("{n} patches failed").into()),
    }
}

fn print_outcome(outcome: &PatchOutcome) {
    match &outcome.status {
        PatchStatus::Applied { .. } => log::info!("{outcome}"),
        PatchStatus::Delegated { instructions } => {
            log::warn!("{outcome}");
            for line in instructions {
                log::warn!("{line}");
            }
        }
        PatchStatus::Skipped { .. } => log::warn!("{outcome}"),
        PatchStatus::Failed { .. } => log::error!("{outcome}"),
    }
}

fn history(args: HistoryArgs) -> Result<(), Box<dyn Error>> {
    let text = fs::read_to_string(&args.log)?;
    let history = DeployHistory::parse(&text);
    let selection = args.selection;

    if selection.list_years {
        for (year, count) in history.year_counts() {
            println!("{year}: {count} deployments");
        }
        return Ok(());
    }

    if !selection.versions.is_empty() {
        for id in history.by_explicit_ids(selection.versions) {
            println!("{id}");
        }
        return Ok(());
    }

    let records = match (selection.year, selection.range) {
        (Some(year), _) => history.by_year(year, args.max),
        (None, Some(range)) => {
            let (start, end) = parse_year_range(&range)
                .ok_or_else(|| format!("invalid year range '{range}', expected START-END"))?;
            history.by_range(start, end, args.max)
        }
        (None, None) => Vec::new(),
    };

    if records.is_empty() {
        log::warn!("No deployments matched");
    }
    for record in records {
        println!("{}\t{}", record.build_hash, record.timestamp);
    }
    Ok(())
}

fn find_client_exe(dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    WalkDir::new(dir)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|f| f.ok())
        .find(|f| {
            f.file_type().is_file()
                && f.path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
        })
        .map(|f| f.into_path())
        .ok_or_else(|| format!("no client executable found in {}", dir.display()).into())
}
