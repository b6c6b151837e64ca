//! Binary entry point for the canopy administrative CLI.
#![forbid(unsafe_code)]

mod ui;

use std::error::Error;
use std::path::{Path, PathBuf};

use canopy::{
    admin::{
        self, open_store, open_tree, AdminOpenOptions, RepairRun, StatsReport, VerifyLevel,
        VerifyReport,
    },
    config::default_config_path,
    Destination, ListScope, NodeId, Position, RepairMode, RootId, TreeConfig,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use ui::{dash, format_duration, ColorMode, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "canopy",
    version,
    about = "Administrative CLI for nested-set tree tables",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(flatten)]
    open: OpenArgs,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = ColorMode::Auto,
        help = "When to color text output"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(
        long,
        global = true,
        env = "CANOPY_CONFIG",
        value_name = "FILE",
        help = "TOML field mapping (defaults to the user config directory)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Override the table name")]
    table: Option<String>,

    #[arg(long, global = true, help = "Treat the table as a single tree")]
    no_root: bool,

    #[arg(long, global = true, help = "Do not maintain cached levels")]
    no_level: bool,

    #[arg(
        long,
        global = true,
        value_name = "MS",
        default_value_t = 5_000,
        help = "How long to wait for another writer's lock"
    )]
    busy_timeout_ms: u64,
}

#[derive(Args, Debug)]
struct PlacementArgs {
    #[arg(long, value_name = "ID", help = "Destination node")]
    to: Option<i64>,

    #[arg(
        long,
        value_enum,
        default_value_t = PositionArg::LastChild,
        help = "Placement relative to --to"
    )]
    position: PositionArg,

    #[arg(
        long,
        value_name = "ROOT",
        conflicts_with = "to",
        help = "Append at the top level of an existing root"
    )]
    root: Option<i64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Create the database file and tree table")]
    Init {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
    },

    #[command(about = "Insert a new node")]
    Add {
        #[arg(value_name = "DB")]
        db_path: PathBuf,

        #[command(flatten)]
        placement: PlacementArgs,
    },

    #[command(about = "Move a node and its subtree")]
    Move {
        #[arg(value_name = "DB")]
        db_path: PathBuf,

        #[arg(value_name = "ID")]
        id: i64,

        #[command(flatten)]
        placement: PlacementArgs,
    },

    #[command(about = "Move a node before an earlier sibling")]
    Up {
        #[arg(value_name = "DB")]
        db_path: PathBuf,

        #[arg(value_name = "ID")]
        id: i64,

        #[arg(long, default_value_t = 1, help = "Number of siblings to pass")]
        steps: usize,
    },

    #[command(about = "Move a node after a later sibling")]
    Down {
        #[arg(value_name = "DB")]
        db_path: PathBuf,

        #[arg(value_name = "ID")]
        id: i64,

        #[arg(long, default_value_t = 1, help = "Number of siblings to pass")]
        steps: usize,
    },

    #[command(about = "Remove a node, promoting its children unless --with-children")]
    Remove {
        #[arg(value_name = "DB")]
        db_path: PathBuf,

        #[arg(value_name = "ID")]
        id: i64,

        #[arg(long, help = "Delete the whole subtree")]
        with_children: bool,
    },

    #[command(about = "Rebuild intervals from parents or parents from intervals")]
    Repair {
        #[arg(value_name = "DB")]
        db_path: PathBuf,

        #[arg(long, value_enum, default_value_t = RepairModeArg::Tree)]
        mode: RepairModeArg,
    },

    #[command(about = "Verify the interval encoding")]
    Verify {
        #[arg(value_name = "DB")]
        db_path: PathBuf,

        #[arg(
            long,
            value_enum,
            default_value_t = VerifyLevelArg::Full,
            help = "Verification level"
        )]
        level: VerifyLevelArg,
    },

    #[command(about = "Report per-root statistics")]
    Stats {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
    },

    #[command(about = "Print the tree with indentation")]
    List {
        #[arg(value_name = "DB")]
        db_path: PathBuf,

        #[arg(long, value_name = "ID", help = "Only list descendants of this node")]
        under: Option<i64>,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum PositionArg {
    FirstChild,
    LastChild,
    PrevSibling,
    NextSibling,
}

impl From<PositionArg> for Position {
    fn from(position: PositionArg) -> Self {
        match position {
            PositionArg::FirstChild => Position::FirstChild,
            PositionArg::LastChild => Position::LastChild,
            PositionArg::PrevSibling => Position::PrevSibling,
            PositionArg::NextSibling => Position::NextSibling,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum RepairModeArg {
    Tree,
    Parent,
}

impl From<RepairModeArg> for RepairMode {
    fn from(mode: RepairModeArg) -> Self {
        match mode {
            RepairModeArg::Tree => RepairMode::Tree,
            RepairModeArg::Parent => RepairMode::Parent,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum VerifyLevelArg {
    Fast,
    Full,
}

impl From<VerifyLevelArg> for VerifyLevel {
    fn from(level: VerifyLevelArg) -> Self {
        match level {
            VerifyLevelArg::Fast => VerifyLevel::Fast,
            VerifyLevelArg::Full => VerifyLevel::Full,
        }
    }
}

#[derive(Serialize)]
struct InitOutput {
    path: String,
    table: String,
}

#[derive(Serialize)]
struct RemoveOutput {
    removed: NodeId,
    with_children: bool,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("canopy=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let ui = Ui::new(cli.color);
    let open_opts = build_open_options(&cli.open)?;

    match cli.command {
        Command::Init { db_path } => {
            let opts = AdminOpenOptions {
                create_if_missing: true,
                ..open_opts
            };
            open_store(&db_path, &opts)?;
            let output = InitOutput {
                path: db_path.display().to_string(),
                table: opts.config.table.clone(),
            };
            emit(&cli.format, &output, || {
                ui.success(&format!(
                    "Initialized table {} in {}",
                    output.table, output.path
                ))
            })?;
        }
        Command::Add { db_path, placement } => {
            let tree = open_tree(&db_path, &open_opts)?;
            let id = tree.insert(destination(&placement))?;
            let node = tree.node(id)?;
            emit(&cli.format, &node, || ui.node(&format!("Added node {id}"), &node))?;
        }
        Command::Move {
            db_path,
            id,
            placement,
        } => {
            let tree = open_tree(&db_path, &open_opts)?;
            tree.move_node(NodeId(id), destination(&placement))?;
            let node = tree.node(NodeId(id))?;
            emit(&cli.format, &node, || ui.node(&format!("Moved node {id}"), &node))?;
        }
        Command::Up { db_path, id, steps } => {
            let tree = open_tree(&db_path, &open_opts)?;
            tree.move_up(NodeId(id), steps)?;
            let node = tree.node(NodeId(id))?;
            emit(&cli.format, &node, || {
                ui.node(&format!("Moved node {id} up"), &node)
            })?;
        }
        Command::Down { db_path, id, steps } => {
            let tree = open_tree(&db_path, &open_opts)?;
            tree.move_down(NodeId(id), steps)?;
            let node = tree.node(NodeId(id))?;
            emit(&cli.format, &node, || {
                ui.node(&format!("Moved node {id} down"), &node)
            })?;
        }
        Command::Remove {
            db_path,
            id,
            with_children,
        } => {
            let tree = open_tree(&db_path, &open_opts)?;
            tree.remove_from_tree(NodeId(id), with_children)?;
            let output = RemoveOutput {
                removed: NodeId(id),
                with_children,
            };
            emit(&cli.format, &output, || {
                let what = if with_children { "subtree" } else { "node" };
                ui.success(&format!("Removed {what} {id}"))
            })?;
        }
        Command::Repair { db_path, mode } => {
            let spinner = ui.spinner(format!("Repairing {}", db_path.display()));
            let run = admin::repair(&db_path, &open_opts, mode.into())?;
            spinner.stop();
            emit(&cli.format, &run, || print_repair_text(&ui, &run))?;
        }
        Command::Verify { db_path, level } => {
            let report = admin::verify(&db_path, &open_opts, level.into())?;
            emit(&cli.format, &report, || print_verify_text(&ui, &report))?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::Stats { db_path } => {
            let report = admin::stats(&db_path, &open_opts)?;
            emit(&cli.format, &report, || print_stats_text(&ui, &report))?;
        }
        Command::List { db_path, under } => {
            let tree = open_tree(&db_path, &open_opts)?;
            let scope = under.map_or(ListScope::All, |id| ListScope::Descendants(NodeId(id)));
            let entries = tree.flatten(scope)?;
            emit(&cli.format, &entries, || ui.tree(&entries))?;
        }
    }

    Ok(())
}

fn build_open_options(args: &OpenArgs) -> Result<AdminOpenOptions, Box<dyn Error>> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(table) = &args.table {
        config = config.with_table(table.clone());
    }
    if args.no_root {
        config = config.without_root();
    }
    if args.no_level {
        config = config.without_level();
    }
    config.validate()?;
    Ok(AdminOpenOptions {
        config,
        busy_timeout_ms: args.busy_timeout_ms,
        ..AdminOpenOptions::default()
    })
}

fn load_config(explicit: Option<&Path>) -> Result<TreeConfig, Box<dyn Error>> {
    if let Some(path) = explicit {
        return Ok(TreeConfig::load(path)?);
    }
    match default_config_path() {
        Some(path) if path.exists() => Ok(TreeConfig::load(path)?),
        _ => Ok(TreeConfig::default()),
    }
}

fn destination(args: &PlacementArgs) -> Destination {
    match (args.to, args.root) {
        (Some(id), _) => Destination::at(NodeId(id), args.position.into()),
        (None, Some(root)) => Destination::Root(RootId(root)),
        (None, None) => Destination::Top,
    }
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_repair_text(ui: &Ui, run: &RepairRun) {
    let elapsed = std::time::Duration::from_secs_f64(run.duration_ms / 1_000.0);
    ui.success(&format!(
        "Repair ({}) finished in {}",
        run.mode,
        format_duration(elapsed)
    ));
    ui.section(
        "Changes",
        [
            ("placed", run.report.placed),
            ("parents_rewritten", run.report.parents_rewritten),
            ("orphans", run.report.orphans.len()),
            ("skipped", run.report.skipped),
        ],
    );
    if !run.report.orphans.is_empty() {
        let ids: Vec<String> = run.report.orphans.iter().map(ToString::to_string).collect();
        ui.section("Orphans", [("ids", ids.join(", "))]);
    }
}

fn print_verify_text(ui: &Ui, report: &VerifyReport) {
    let level = match report.level {
        VerifyLevel::Fast => "fast",
        VerifyLevel::Full => "full",
    };
    if report.success {
        ui.success(&format!("Verify ({level}) passed"));
    } else {
        ui.warn(&format!("Verify ({level}) found errors"));
    }
    ui.section(
        "Counts",
        [
            ("nodes", report.counts.nodes),
            ("placed", report.counts.placed),
            ("placeholders", report.counts.placeholders),
            ("roots", report.counts.roots),
        ],
    );
    ui.findings(&report.findings);
}

fn print_stats_text(ui: &Ui, report: &StatsReport) {
    ui.section(
        "Table",
        [
            ("name", report.table.name.clone()),
            ("nodes", report.table.nodes.to_string()),
            ("placed", report.table.placed.to_string()),
            ("placeholders", report.table.placeholders.to_string()),
            ("rooted", report.table.rooted.to_string()),
            ("cached_levels", report.table.cached_levels.to_string()),
        ],
    );
    let roots: Vec<Vec<String>> = report
        .roots
        .iter()
        .map(|root| {
            vec![
                dash(root.root),
                root.nodes.to_string(),
                root.max_depth.to_string(),
                root.max_right.to_string(),
            ]
        })
        .collect();
    ui.table("Roots", &["root", "nodes", "max_depth", "max_right"], &roots);
    ui.section(
        "Filesystem",
        [
            ("db_path", report.filesystem.db_path.clone()),
            ("db_size", report.filesystem.db_size_bytes.to_string()),
            ("wal_path", report.filesystem.wal_path.clone()),
            ("wal_size", report.filesystem.wal_size_bytes.to_string()),
        ],
    );
}
