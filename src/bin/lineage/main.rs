//! Binary entry point for the lineage administrative CLI.
#![forbid(unsafe_code)]

mod config;
mod ui;

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use lineage::admin::{repair, verify, RepairOptions, RepairReport, VerifyLevel, VerifyReport};
use lineage::cli::import_export::{
    run_export, run_import, ExportConfig, ImportConfig, ImportSummary,
};
use lineage::hierarchy::{CascadeReport, DeleteOutcome, HierarchyEngine, Reparented};
use lineage::model::{Contact, NewAssociation};
use lineage::storage::SqliteStore;
use lineage::{Association, AssociationId, Club, ClubId, Status};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use config::CliConfig;
use ui::{format_duration, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "lineage",
    version,
    about = "Maintain a consistent hierarchy of associations and clubs",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "LINEAGE_DB",
        value_name = "PATH",
        help = "SQLite database file"
    )]
    db: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "LINEAGE_CONFIG",
        value_name = "PATH",
        help = "CLI config file (defaults to <config dir>/lineage/cli.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(short, long, global = true, help = "Enable debug logging on stderr")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an association
    Create(CreateCmd),
    /// Move an association under another parent, or to the top level
    Move {
        id: String,
        #[arg(long, required_unless_present = "root", conflicts_with = "root")]
        parent: Option<String>,
        #[arg(long, help = "Promote to a top-level association")]
        root: bool,
    },
    /// Soft-delete an association
    Delete { id: String },
    /// Change the status of an association
    Status { id: String, status: Status },
    /// Attach a club to an association
    AddClub {
        id: String,
        #[arg(long)]
        parent: String,
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Move a club to another association
    MoveClub {
        id: String,
        #[arg(long)]
        parent: String,
    },
    /// Print the whole forest
    Tree,
    /// Show one association with its neighbourhood
    Show { id: String },
    /// Audit stored paths against parent links
    Verify {
        #[arg(long, value_enum, default_value_t = LevelArg::Full)]
        level: LevelArg,
    },
    /// Rebuild every stored path from parent links
    Repair {
        #[arg(long, help = "Report changes without writing")]
        dry_run: bool,
    },
    /// Finish an interrupted descendant reindex
    Resume { id: String },
    /// Import associations and clubs from CSV
    Import(ImportCmd),
    /// Export the forest as JSON
    Export {
        #[arg(short, long, value_name = "FILE", help = "Write to FILE instead of stdout")]
        out: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
    },
}

impl Command {
    fn writes(&self) -> bool {
        match self {
            Command::Tree | Command::Show { .. } | Command::Verify { .. } | Command::Export { .. } => {
                false
            }
            Command::Repair { dry_run } => !dry_run,
            _ => true,
        }
    }
}

#[derive(Args, Debug)]
struct CreateCmd {
    id: String,
    #[arg(long)]
    code: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    parent: Option<String>,
    #[arg(long)]
    status: Option<Status>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    website: Option<String>,
    #[arg(long)]
    address: Option<String>,
}

#[derive(Args, Debug)]
struct ImportCmd {
    #[arg(long, value_name = "FILE", help = "CSV with id,code,parent_id,name[,status]")]
    associations: Option<PathBuf>,
    #[arg(long, value_name = "FILE", help = "CSV with id,parent_id,name")]
    clubs: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LevelArg {
    Fast,
    Full,
}

impl From<LevelArg> for VerifyLevel {
    fn from(value: LevelArg) -> Self {
        match value {
            LevelArg::Fast => VerifyLevel::Fast,
            LevelArg::Full => VerifyLevel::Full,
        }
    }
}

#[derive(Serialize)]
struct DeleteReport {
    id: AssociationId,
    outcome: DeleteOutcome,
}

#[derive(Serialize)]
struct ShowReport {
    association: Association,
    ancestors: Vec<AssociationId>,
    children: Vec<AssociationId>,
    clubs: Vec<Club>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let Cli {
        db,
        config,
        format,
        verbose,
        command,
    } = Cli::parse();
    install_tracing(verbose);

    let config = CliConfig::load(config)?;
    if let Some(path) = config.path() {
        tracing::debug!(path = %path.display(), "cli config");
    }
    let db_path = db
        .or_else(|| config.default_db_path().cloned())
        .ok_or("no database given; pass --db, set LINEAGE_DB, or set [database] default in the config")?;
    let store = Arc::new(SqliteStore::open(&db_path)?);
    // one writing process at a time per database file
    let claim = if command.writes() {
        Some(store.claim_writer()?)
    } else {
        None
    };
    let engine = HierarchyEngine::new(Arc::clone(&store)).with_config(config.engine_config());
    let ui = Ui::new();

    match command {
        Command::Create(cmd) => {
            let mut candidate = NewAssociation::new(cmd.id, cmd.code, cmd.name).with_contact(Contact {
                address: cmd.address,
                email: cmd.email,
                phone: cmd.phone,
                website: cmd.website,
            });
            if let Some(parent) = cmd.parent {
                candidate = candidate.with_parent(parent);
            }
            if let Some(status) = cmd.status {
                candidate = candidate.with_status(status);
            }
            let created = engine.create_association(candidate)?;
            emit(format, &created, || {
                ui.success(&format!("created {} at level {}", created.id, created.level));
                print_association(&ui, &created);
            })?;
        }
        Command::Move { id, parent, root } => {
            let target = if root { None } else { parent.map(AssociationId::from) };
            let moved = engine.reparent_association(&AssociationId::from(id), target)?;
            emit(format, &moved, || print_move(&ui, &moved))?;
        }
        Command::Delete { id } => {
            let id = AssociationId::from(id);
            let outcome = engine.delete_association(&id)?;
            let report = DeleteReport { id, outcome };
            emit(format, &report, || match report.outcome {
                DeleteOutcome::Deactivated => ui.success(&format!("{} is now inactive", report.id)),
                DeleteOutcome::AlreadyInactive => {
                    ui.success(&format!("{} was already inactive", report.id))
                }
            })?;
        }
        Command::Status { id, status } => {
            let updated = engine.set_status(&AssociationId::from(id), status)?;
            emit(format, &updated, || {
                ui.success(&format!("{} is now {}", updated.id, updated.status))
            })?;
        }
        Command::AddClub { id, parent, name } => {
            let club = engine.add_club(Club::new(id, parent, name))?;
            emit(format, &club, || {
                ui.success(&format!("club {} attached to {}", club.id, club.parent_id))
            })?;
        }
        Command::MoveClub { id, parent } => {
            let club = engine.move_club(&ClubId::from(id), &AssociationId::from(parent))?;
            emit(format, &club, || {
                ui.success(&format!("club {} now belongs to {}", club.id, club.parent_id))
            })?;
        }
        Command::Tree => {
            let forest = engine.build_forest()?;
            match format {
                OutputFormat::Json => {
                    let stdout = std::io::stdout();
                    let mut writer = stdout.lock();
                    forest.write_json(&mut writer, true)?;
                    writeln!(writer)?;
                }
                OutputFormat::Text => ui.tree(&forest),
            }
        }
        Command::Show { id } => {
            let id = AssociationId::from(id);
            let association = engine
                .association(&id)?
                .ok_or_else(|| format!("association '{id}' not found"))?;
            let report = ShowReport {
                ancestors: engine.ancestors(&id)?.into_iter().map(|a| a.id).collect(),
                children: engine.children(&id)?.into_iter().map(|a| a.id).collect(),
                clubs: engine.clubs(&id)?,
                association,
            };
            emit(format, &report, || print_show(&ui, &report))?;
        }
        Command::Verify { level } => {
            let report = verify(engine.store(), level.into())?;
            emit(format, &report, || print_verify(&ui, &report))?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::Repair { dry_run } => {
            let task = ui.task("rebuilding materialized paths");
            let report = repair(&engine, RepairOptions { dry_run })?;
            let elapsed = task.finish();
            emit(format, &report, || print_repair(&ui, &report, &format_duration(elapsed)))?;
        }
        Command::Resume { id } => {
            let report = engine.resume_cascade(&AssociationId::from(id))?;
            emit(format, &report, || print_cascade(&ui, &report))?;
        }
        Command::Import(cmd) => {
            let import_cfg = ImportConfig {
                associations: cmd.associations,
                clubs: cmd.clubs,
            };
            let task = ui.task("importing");
            let summary = run_import(&engine, &import_cfg)?;
            let elapsed = task.finish();
            emit(format, &summary, || print_import(&ui, &summary, &format_duration(elapsed)))?;
        }
        Command::Export { out, pretty } => {
            let to_file = out.is_some();
            let summary = run_export(&engine, &ExportConfig { out, pretty })?;
            if to_file {
                emit(format, &summary, || {
                    ui.success(&format!(
                        "exported {} associations and {} clubs",
                        summary.associations_exported, summary.clubs_exported
                    ))
                })?;
            }
        }
    }

    if let Some(claim) = claim {
        claim.release()?;
    }
    Ok(())
}

fn install_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("lineage=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lineage=info"))
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce(),
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

fn print_association(ui: &Ui, association: &Association) {
    let parent = association
        .parent_id
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".into());
    let path = association
        .hierarchy
        .iter()
        .map(AssociationId::as_str)
        .collect::<Vec<_>>()
        .join(" / ");
    ui.section(
        association.name.as_str(),
        [
            ("id", association.id.to_string()),
            ("code", association.code.clone()),
            ("parent", parent),
            ("level", association.level.to_string()),
            ("path", path),
            ("status", association.status.to_string()),
        ],
    );
}

fn print_move(ui: &Ui, moved: &Reparented) {
    let target = moved
        .association
        .parent_id
        .as_ref()
        .map(|p| format!("under {p}"))
        .unwrap_or_else(|| "to the top level".into());
    ui.success(&format!(
        "moved {} {target}; {} of {} descendants reindexed",
        moved.association.id,
        moved.cascade.repaired.len(),
        moved.cascade.total
    ));
}

fn print_show(ui: &Ui, report: &ShowReport) {
    print_association(ui, &report.association);
    ui.list(
        "Children",
        report.children.iter().map(ToString::to_string),
    );
    ui.list(
        "Clubs",
        report
            .clubs
            .iter()
            .map(|club| format!("{} {}", club.id, club.name)),
    );
}

fn print_verify(ui: &Ui, report: &VerifyReport) {
    ui.section(
        &format!("Verify ({:?})", report.level),
        [
            ("success", report.success.to_string()),
            ("associations", report.counts.associations.to_string()),
            ("roots", report.counts.roots.to_string()),
            ("clubs", report.counts.clubs.to_string()),
            ("stale paths", report.counts.stale_paths.to_string()),
            ("broken chains", report.counts.broken_chains.to_string()),
        ],
    );
    ui.list(
        "Findings",
        report
            .findings
            .iter()
            .map(|f| format!("{:?} {}: {}", f.severity, f.subject, f.message)),
    );
}

fn print_repair(ui: &Ui, report: &RepairReport, elapsed: &str) {
    let verb = if report.dry_run { "would rewrite" } else { "rewrote" };
    ui.success(&format!(
        "examined {} associations, {verb} {} paths in {elapsed}",
        report.examined,
        report.rewritten.len()
    ));
    ui.list("Rewritten", report.rewritten.iter().map(ToString::to_string));
    ui.list(
        "Unreachable",
        report.unreachable.iter().map(ToString::to_string),
    );
    for failure in &report.failed {
        ui.warn(&format!("{}: {}", failure.id, failure.reason));
    }
}

fn print_cascade(ui: &Ui, report: &CascadeReport) {
    ui.success(&format!(
        "{}: {} descendants, {} rewritten, {} already current",
        report.anchor,
        report.total,
        report.repaired.len(),
        report.unchanged.len()
    ));
}

fn print_import(ui: &Ui, summary: &ImportSummary, elapsed: &str) {
    ui.success(&format!(
        "imported {} associations and {} clubs in {elapsed}",
        summary.associations_imported, summary.clubs_imported
    ));
    for row in &summary.rejected {
        ui.warn(&format!(
            "{} line {} ({}): {}",
            row.collection, row.line, row.id, row.reason
        ));
    }
}
