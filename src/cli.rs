//! CLI definition and dispatch.

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::console_alert_adapter::ConsoleAlertAdapter;
use crate::adapters::csv_snapshot_adapter::CsvSnapshotAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::history_csv_adapter::write_history;
use crate::adapters::json_snapshot_adapter::JsonSnapshotAdapter;
use crate::adapters::json_workspace_adapter::JsonWorkspaceAdapter;
use crate::adapters::tick_feed_adapter::{FeedEvent, TickFeedReader};
use crate::domain::config_validation::{load_settings, OutputFormat, Settings};
use crate::domain::engine::EngineState;
use crate::domain::entity::{EntityKind, Workspace};
use crate::domain::error::{FormulaError, TickwatchError};
use crate::domain::expr_eval::validate_formula;
use crate::domain::formula::{references, VariableRef};
use crate::domain::history::HistoryRecorder;
use crate::ports::alert_port::AlertSink;
use crate::ports::snapshot_port::SnapshotSink;
use crate::ports::workspace_port::WorkspaceSource;

#[derive(Parser, Debug)]
#[command(name = "tickwatch", about = "Market tick derivation and alert engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    Csv,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Csv => OutputFormat::Csv,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a tick feed through the engine
    Run {
        /// Workspace JSON file
        #[arg(short, long)]
        workspace: PathBuf,
        /// Workspace id to use instead of the active one
        #[arg(long)]
        workspace_id: Option<i64>,
        /// INI configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Line-delimited tick feed; stdin when omitted or `-`
        #[arg(short, long)]
        feed: Option<PathBuf>,
        /// Snapshot output file; overrides [output] path
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Snapshot output format; overrides [output] format
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        /// Abort on the first malformed feed line
        #[arg(long)]
        strict: bool,
    },
    /// Check a workspace and its formulas
    Validate {
        #[arg(short, long)]
        workspace: PathBuf,
        #[arg(long)]
        workspace_id: Option<i64>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the effective raw-key to field-name table
    Fields {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Run {
            workspace,
            workspace_id,
            config,
            feed,
            output,
            format,
            strict,
        } => run_replay(&RunOptions {
            workspace,
            workspace_id,
            config,
            feed,
            output,
            format: format.map(OutputFormat::from),
            strict,
        }),
        Command::Validate {
            workspace,
            workspace_id,
            config,
        } => run_validate(&workspace, workspace_id, config.as_deref()),
        Command::Fields { config } => run_fields(config.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub struct RunOptions {
    pub workspace: PathBuf,
    pub workspace_id: Option<i64>,
    pub config: Option<PathBuf>,
    pub feed: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub strict: bool,
}

/// Totals for one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: usize,
    pub accepted: usize,
    pub dropped: usize,
    pub alerts: usize,
    pub resets: usize,
    pub bad_lines: usize,
}

/// Load and validate settings; defaults when no file is given.
pub fn load_settings_from(path: Option<&Path>) -> Result<Settings, TickwatchError> {
    match path {
        Some(path) => load_settings(&FileConfigAdapter::from_file(path)?),
        None => load_settings(&FileConfigAdapter::empty()),
    }
}

pub fn load_workspace(path: &Path, id: Option<i64>) -> Result<Workspace, TickwatchError> {
    JsonWorkspaceAdapter::new(path.to_path_buf()).active_workspace(id)
}

/// Drive the engine over a feed, publishing after every batch.
pub fn replay(
    engine: &mut EngineState,
    feed: impl Iterator<Item = Result<FeedEvent, TickwatchError>>,
    alerts: &mut dyn AlertSink,
    sink: &mut dyn SnapshotSink,
    history: &mut HistoryRecorder,
    strict: bool,
) -> Result<RunSummary, TickwatchError> {
    let mut summary = RunSummary::default();

    for event in feed {
        match event {
            Ok(FeedEvent::Batch(batch)) => {
                let report = engine.ingest(&batch, alerts);
                summary.cycles += 1;
                summary.accepted += report.ingest.accepted;
                summary.dropped += report.ingest.dropped;
                summary.alerts += report.alerts.len();
                log::debug!(
                    "cycle {}: {} entities, {} solver pass(es)",
                    summary.cycles,
                    report.entities,
                    report.solve.passes
                );
                sink.publish(summary.cycles, engine.snapshot())?;
                history.record(engine.snapshot(), Utc::now());
            }
            Ok(FeedEvent::Reset) => {
                log::info!("feed reset, clearing engine data");
                engine.clear();
                history.clear();
                summary.resets += 1;
            }
            Err(e @ TickwatchError::Feed { .. }) if !strict => {
                log::warn!("skipping feed line: {}", e);
                summary.bad_lines += 1;
            }
            Err(e) => return Err(e),
        }
    }

    sink.finish()?;
    Ok(summary)
}

fn open_feed(path: Option<&Path>) -> Result<Box<dyn BufRead>, TickwatchError> {
    match path {
        Some(p) if p != Path::new("-") => Ok(Box::new(BufReader::new(File::open(p)?))),
        _ => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>, TickwatchError> {
    match path {
        Some(p) => Ok(Box::new(BufWriter::new(File::create(p)?))),
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

fn run_replay(opts: &RunOptions) -> Result<(), TickwatchError> {
    let settings = load_settings_from(opts.config.as_deref())?;
    let workspace = load_workspace(&opts.workspace, opts.workspace_id)?;
    log::info!(
        "workspace '{}' ({} entities)",
        workspace.name,
        workspace.entities().len()
    );

    let output_path = opts
        .output
        .clone()
        .or_else(|| settings.output.path.as_ref().map(PathBuf::from));
    let out = open_output(output_path.as_deref())?;
    let mut sink: Box<dyn SnapshotSink> = match opts.format.unwrap_or(settings.output.format) {
        OutputFormat::Json => Box::new(JsonSnapshotAdapter::new(out)),
        OutputFormat::Csv => {
            Box::new(CsvSnapshotAdapter::new(out).with_order(workspace.display_order()))
        }
    };

    let feed = TickFeedReader::new(open_feed(opts.feed.as_deref())?);
    let mut engine = EngineState::with_workspace(settings.engine.clone(), workspace);
    let mut alerts = ConsoleAlertAdapter::stderr(settings.alerts);
    let mut history = HistoryRecorder::new(settings.history_max_points);

    let summary = replay(
        &mut engine,
        feed,
        &mut alerts,
        sink.as_mut(),
        &mut history,
        opts.strict,
    )?;

    if let Some(path) = &settings.output.history_path {
        write_history(&history, BufWriter::new(File::create(path)?))?;
        log::info!("history written to {}", path);
    }

    eprintln!(
        "{} cycle(s), {} tick(s) accepted, {} dropped, {} alert(s), {} reset(s), {} bad line(s)",
        summary.cycles,
        summary.accepted,
        summary.dropped,
        summary.alerts,
        summary.resets,
        summary.bad_lines
    );
    Ok(())
}

/// One problem found by `validate`.
#[derive(Debug)]
pub struct Issue {
    pub entity: String,
    pub error: TickwatchError,
    /// Caret diagnostic for parse errors.
    pub context: Option<String>,
}

/// Check every formula and cross-reference in a workspace.
pub fn check_workspace(workspace: &Workspace) -> (Vec<Issue>, Vec<String>) {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();
    let index = workspace.name_index();

    for entity in workspace.entities() {
        let formula = match &entity.kind {
            EntityKind::CustomField(def) => &def.formula,
            EntityKind::AlertRule(def) => &def.condition,
            EntityKind::BaseStock(def) => {
                if def.code.trim().is_empty() {
                    warnings.push(format!("base stock '{}' has no code", entity.name));
                }
                continue;
            }
            EntityKind::StockGroup(def) => {
                for member in &def.members {
                    if workspace.base_stock_by_code(member).is_none() {
                        warnings.push(format!(
                            "group '{}' member '{}' matches no base stock",
                            entity.name, member
                        ));
                    }
                }
                continue;
            }
        };
        if formula.trim().is_empty() {
            warnings.push(format!("'{}' has an empty formula", entity.name));
            continue;
        }
        for var in references(formula) {
            if let VariableRef::Named { entity: target, .. } = var {
                if index.canonical(&target).is_none() {
                    warnings.push(format!(
                        "'{}' references unknown entity '{}'",
                        entity.name, target
                    ));
                }
            }
        }

        match validate_formula(formula) {
            Ok(()) => {}
            Err(FormulaError::Parse(e)) => issues.push(Issue {
                entity: entity.name.clone(),
                context: Some(e.display_with_context(formula)),
                error: TickwatchError::FormulaParse(e),
            }),
            Err(FormulaError::Eval(e)) => issues.push(Issue {
                entity: entity.name.clone(),
                context: None,
                error: TickwatchError::FormulaInvalid {
                    entity: entity.name.clone(),
                    reason: e.to_string(),
                },
            }),
        }
    }

    (issues, warnings)
}

fn run_validate(
    workspace_path: &Path,
    workspace_id: Option<i64>,
    config: Option<&Path>,
) -> Result<(), TickwatchError> {
    load_settings_from(config)?;
    eprintln!("Validating workspace: {}", workspace_path.display());
    let workspace = load_workspace(workspace_path, workspace_id)?;

    let (issues, warnings) = check_workspace(&workspace);
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    for issue in &issues {
        eprintln!("\n{}:", issue.entity);
        match &issue.context {
            Some(context) => eprintln!("  error: {context}"),
            None => eprintln!("  error: {}", issue.error),
        }
    }

    let mut issues = issues;
    if issues.is_empty() {
        eprintln!(
            "workspace '{}' is valid ({} entities)",
            workspace.name,
            workspace.entities().len()
        );
        Ok(())
    } else {
        Err(issues.swap_remove(0).error)
    }
}

fn run_fields(config: Option<&Path>) -> Result<(), TickwatchError> {
    let settings = load_settings_from(config)?;
    let mut out = io::stdout().lock();
    for (raw, display) in settings.engine.fields.entries() {
        writeln!(out, "{raw}\t{display}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_arguments() {
        let cli = Cli::parse_from([
            "tickwatch",
            "run",
            "-w",
            "ws.json",
            "--feed",
            "ticks.jsonl",
            "--format",
            "csv",
            "--strict",
        ]);
        match cli.command {
            Command::Run {
                workspace,
                feed,
                format,
                strict,
                ..
            } => {
                assert_eq!(workspace, PathBuf::from("ws.json"));
                assert_eq!(feed, Some(PathBuf::from("ticks.jsonl")));
                assert_eq!(format, Some(FormatArg::Csv));
                assert!(strict);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }
}
