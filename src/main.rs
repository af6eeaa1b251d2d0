use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use curricula::config::{
    ConfigError, EffectiveConfig, default_global_config_yaml, default_repo_config_yaml,
    load_effective_config,
};
use curricula::error::{ErrorKind, StoreError};
use curricula::identity::{ConfiguredIdentity, IdentityError, IdentityProvider};
use curricula::mapping::editor::{EditorError, MappingEditor};
use curricula::mapping::matrix;
use curricula::mapping::stats::compute_stats;
use curricula::mapping::{MappingContext, MappingStore, Strength};
use curricula::outcome::catalog::{CatalogError, expand_catalog_paths, load_catalog};
use curricula::outcome::{Level, LevelPair, OutcomeProvider, order_by_reference};
use curricula::store::drafts::{DraftError, replace_contents};
use curricula::store::{DraftStore, SqliteStore};
use curricula::termplan::workflow::{TermPlan, WorkflowError};
use curricula::termplan::{ReviewDecision, RowEdit, TermRow};
use serde_json::{Value, json};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_ENV: &str = "CURRICULA_LOG";
const USER_ENV: &str = "CURRICULA_USER";

#[derive(Debug)]
struct CliError {
    code: &'static str,
    message: String,
    kind: ErrorKind,
}

impl CliError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(code, ErrorKind::Validation, message)
    }

    fn with_kind(code: &'static str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            kind,
        }
    }

    fn io(code: &'static str, err: io::Error) -> Self {
        Self::with_kind(code, ErrorKind::Transport, err.to_string())
    }
}

fn code_for(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation_error",
        ErrorKind::NotFound => "not_found",
        ErrorKind::Conflict => "conflict",
        ErrorKind::Transport => "store_error",
    }
}

impl From<StoreError> for CliError {
    fn from(value: StoreError) -> Self {
        let kind = value.kind();
        Self::with_kind(code_for(kind), kind, value.to_string())
    }
}

impl From<EditorError> for CliError {
    fn from(value: EditorError) -> Self {
        let kind = value.kind();
        Self::with_kind(code_for(kind), kind, value.to_string())
    }
}

impl From<WorkflowError> for CliError {
    fn from(value: WorkflowError) -> Self {
        let kind = value.kind();
        Self::with_kind(code_for(kind), kind, value.to_string())
    }
}

impl From<DraftError> for CliError {
    fn from(value: DraftError) -> Self {
        let kind = value.kind();
        Self::with_kind(code_for(kind), kind, value.to_string())
    }
}

impl From<IdentityError> for CliError {
    fn from(value: IdentityError) -> Self {
        Self::new("identity_error", value.to_string())
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::new("config_error", value.to_string())
    }
}

impl From<CatalogError> for CliError {
    fn from(value: CatalogError) -> Self {
        Self::new("catalog_error", value.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::with_kind("json_error", ErrorKind::Transport, value.to_string())
    }
}

#[derive(Parser, Debug)]
#[command(name = "curricula")]
#[command(about = "Outcome mapping and term-plan approval for curricula")]
struct Cli {
    #[arg(long, global = true)]
    global: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Init,
    #[command(subcommand)]
    Outcome(OutcomeCommand),
    #[command(subcommand)]
    Map(MapCommand),
    #[command(subcommand)]
    Term(TermCommand),
}

#[derive(Subcommand, Debug)]
enum OutcomeCommand {
    /// Loads outcome catalogs; defaults to the `outcomes` config entries.
    Import(ImportArgs),
    List(ListArgs),
}

#[derive(Args, Debug)]
struct ImportArgs {
    paths: Vec<String>,
}

#[derive(Args, Debug)]
struct ListArgs {
    context: String,
    #[arg(long)]
    level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum MapCommand {
    Set(SetArgs),
    Delete(EdgeArgs),
    Matrix(MatrixArgs),
    Stats(ContextArgs),
}

#[derive(Args, Debug, Clone)]
struct ContextArgs {
    context: String,
    #[arg(long, default_value = "co-po")]
    pair: String,
}

#[derive(Args, Debug)]
struct EdgeArgs {
    #[command(flatten)]
    context: ContextArgs,
    #[arg(long)]
    source: String,
    #[arg(long)]
    target: String,
}

#[derive(Args, Debug)]
struct SetArgs {
    #[command(flatten)]
    edge: EdgeArgs,
    #[arg(long, default_value = "1")]
    strength: String,
    #[arg(long, default_value = "")]
    justification: String,
    #[arg(long, default_value = "")]
    contribution: String,
}

#[derive(Args, Debug)]
struct MatrixArgs {
    #[command(flatten)]
    context: ContextArgs,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum TermCommand {
    /// Adds or edits one term row of the local draft.
    Row(RowArgs),
    RemoveRow(RemoveRowArgs),
    Save(CurriculumArgs),
    Submit(CurriculumArgs),
    Status(StatusArgs),
    Owner(OwnerArgs),
    Review(ReviewArgs),
}

#[derive(Args, Debug)]
struct CurriculumArgs {
    curriculum: String,
}

#[derive(Args, Debug)]
struct RowArgs {
    curriculum: String,
    #[arg(long)]
    si_no: u32,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    weeks: Option<u32>,
    #[arg(long)]
    credits: Option<u32>,
    #[arg(long)]
    theory: Option<u32>,
    #[arg(long)]
    practical: Option<u32>,
    #[arg(long)]
    start_year: Option<i32>,
    #[arg(long)]
    end_year: Option<i32>,
}

#[derive(Args, Debug)]
struct RemoveRowArgs {
    curriculum: String,
    #[arg(long)]
    si_no: u32,
}

#[derive(Args, Debug)]
struct StatusArgs {
    curriculum: String,
    /// Drops the local draft and reloads rows from the store.
    #[arg(long)]
    reload: bool,
}

#[derive(Args, Debug)]
struct OwnerArgs {
    curriculum: String,
    user_id: String,
}

#[derive(Args, Debug)]
struct ReviewArgs {
    curriculum: String,
    #[arg(value_enum)]
    decision: DecisionArg,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum DecisionArg {
    Approve,
    Reject,
}

#[derive(Debug, Clone)]
struct RepoPaths {
    root: PathBuf,
    index: PathBuf,
    cache_root: PathBuf,
    drafts: PathBuf,
    repo_config: PathBuf,
    user_config: PathBuf,
    mode: StorageMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageMode {
    RepoLocal,
    Global,
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let payload = json!({
                "error": {
                    "code": err.code,
                    "message": err.message,
                    "kind": err.kind.as_str(),
                }
            });
            eprintln!("{payload}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().map_err(|err| CliError::io("cwd_error", err))?;
    let paths = repo_paths(&cwd, cli.global)?;
    match cli.command {
        Command::Init => cmd_init(&paths),
        Command::Outcome(OutcomeCommand::Import(args)) => cmd_outcome_import(&cwd, &paths, args),
        Command::Outcome(OutcomeCommand::List(args)) => cmd_outcome_list(&paths, args),
        Command::Map(MapCommand::Set(args)) => cmd_map_set(&cwd, &paths, args),
        Command::Map(MapCommand::Delete(args)) => cmd_map_delete(&paths, args),
        Command::Map(MapCommand::Matrix(args)) => cmd_map_matrix(&cwd, &paths, args),
        Command::Map(MapCommand::Stats(args)) => cmd_map_stats(&paths, args),
        Command::Term(command) => cmd_term(&cwd, &paths, command),
    }
}

fn cmd_init(paths: &RepoPaths) -> Result<(), CliError> {
    fs::create_dir_all(&paths.root).map_err(|err| CliError::io("mkdir_error", err))?;
    fs::create_dir_all(&paths.drafts).map_err(|err| CliError::io("mkdir_error", err))?;
    let _ = SqliteStore::open(&path_string(&paths.index))?;
    write_default_config(paths)?;

    print_json(&json!({
        "status": "ok",
        "curricula_dir": paths.root,
        "cache_dir": paths.cache_root,
        "index": paths.index,
        "mode": match paths.mode {
            StorageMode::RepoLocal => "repo",
            StorageMode::Global => "global",
        },
    }))
}

fn cmd_outcome_import(cwd: &Path, paths: &RepoPaths, args: ImportArgs) -> Result<(), CliError> {
    require_initialized_paths(paths)?;
    let entries = if args.paths.is_empty() {
        load_config(cwd, paths)?.outcomes
    } else {
        args.paths
    };
    if entries.is_empty() {
        return Err(CliError::new(
            "missing_catalogs",
            "no outcome catalogs given; pass paths or add `outcomes` to .curricula/config.yml",
        ));
    }

    let files = expand_catalog_paths(cwd, &entries)?;
    let store = open_store(paths)?;
    let mut reports = Vec::new();
    for file in files {
        let catalog = load_catalog(&file)?;
        let report = store.import_catalog(&catalog)?;
        reports.push(json!({
            "path": file,
            "context": report.context,
            "imported": report.imported,
            "newly_linked": report.newly_linked,
            "duplicates": report.duplicates.iter().map(|dup| json!({
                "id": dup.id,
                "code": dup.reference_code,
                "reason": dup.reason.as_str(),
            })).collect::<Vec<_>>(),
        }));
    }

    print_json(&json!({
        "status": "ok",
        "catalogs": reports,
    }))
}

fn cmd_outcome_list(paths: &RepoPaths, args: ListArgs) -> Result<(), CliError> {
    require_initialized_paths(paths)?;
    let level = args.level.as_deref().map(parse_level).transpose()?;
    let store = open_store(paths)?;
    let mut outcomes = store.list(&args.context)?;
    if let Some(level) = level {
        outcomes.retain(|outcome| outcome.level == level);
    }
    order_by_reference(&mut outcomes);

    print_json(&json!({
        "context": args.context,
        "outcomes": outcomes,
    }))
}

fn cmd_map_set(cwd: &Path, paths: &RepoPaths, args: SetArgs) -> Result<(), CliError> {
    require_initialized_paths(paths)?;
    let config = load_config(cwd, paths)?;
    let context = mapping_context(&args.edge.context)?;
    let store = open_store(paths)?;
    let source = find_outcome(&store, &context.id, &args.edge.source)?;
    let target = find_outcome(&store, &context.id, &args.edge.target)?;

    let mut editor = MappingEditor::new(config.validation);
    let buffer = editor.open(&store, &context, &source, &target)?;
    // Unknown strengths stay out of range so the editor reports them.
    buffer.strength = Strength::parse(&args.strength)
        .map(Strength::level)
        .or_else(|| args.strength.trim().parse().ok())
        .unwrap_or(0);
    buffer.justification = args.justification;
    buffer.contribution = args.contribution;

    let committed = match editor.commit(&store, &store) {
        Ok(committed) => committed,
        Err(EditorError::Validation(errors)) => {
            let first = errors.values().next().cloned().unwrap_or_default();
            let fields: Vec<&str> = errors.keys().map(|field| field.as_str()).collect();
            return Err(CliError::new(
                "validation_error",
                format!("{first} (fields: {})", fields.join(", ")),
            ));
        }
        Err(err) => return Err(err.into()),
    };

    print_json(&json!({
        "status": "ok",
        "created": committed.created,
        "edge": committed.edge,
        "stats": compute_stats(&store.get_all(&context)?),
        "mapped": committed.matrix.mapped_count(),
        "cells": committed.matrix.cell_count(),
    }))
}

fn cmd_map_delete(paths: &RepoPaths, args: EdgeArgs) -> Result<(), CliError> {
    require_initialized_paths(paths)?;
    let context = mapping_context(&args.context)?;
    let store = open_store(paths)?;
    let source = find_outcome(&store, &context.id, &args.source)?;
    let target = find_outcome(&store, &context.id, &args.target)?;
    let removed = store.delete(&context, &source.id, &target.id)?;

    print_json(&json!({
        "status": "ok",
        "removed": removed,
    }))
}

fn cmd_map_matrix(cwd: &Path, paths: &RepoPaths, args: MatrixArgs) -> Result<(), CliError> {
    require_initialized_paths(paths)?;
    let context = mapping_context(&args.context)?;
    let store = open_store(paths)?;
    let built = matrix::build(&store, &store, &context)?;

    if let Some(out) = args.out {
        let out = if out.is_absolute() { out } else { cwd.join(out) };
        let mut rendered = serde_json::to_vec_pretty(&built)?;
        rendered.push(b'\n');
        replace_contents(&out, &rendered).map_err(|err| CliError::io("write_error", err))?;
        return print_json(&json!({
            "status": "ok",
            "out": out,
            "rows": built.rows.len(),
            "columns": built.columns.len(),
            "mapped": built.mapped_count(),
        }));
    }

    let rows: Vec<Value> = built
        .rows
        .iter()
        .enumerate()
        .map(|(r, row)| {
            let cells: Vec<Value> = built
                .columns
                .iter()
                .enumerate()
                .map(|(c, column)| match built.cell(r, c) {
                    Some(edge) => json!({
                        "target": column.reference_code,
                        "strength": edge.strength.level(),
                    }),
                    None => json!({ "target": column.reference_code, "strength": null }),
                })
                .collect();
            json!({ "source": row.reference_code, "cells": cells })
        })
        .collect();

    print_json(&json!({
        "context": context.id,
        "pair": context.pair.as_str(),
        "columns": built.columns.iter().map(|c| c.reference_code.as_str()).collect::<Vec<_>>(),
        "rows": rows,
        "mapped": built.mapped_count(),
    }))
}

fn cmd_map_stats(paths: &RepoPaths, args: ContextArgs) -> Result<(), CliError> {
    require_initialized_paths(paths)?;
    let context = mapping_context(&args)?;
    let store = open_store(paths)?;
    let stats = compute_stats(&store.get_all(&context)?);

    print_json(&json!({
        "context": context.id,
        "pair": context.pair.as_str(),
        "stats": stats,
    }))
}

fn cmd_term(cwd: &Path, paths: &RepoPaths, command: TermCommand) -> Result<(), CliError> {
    require_initialized_paths(paths)?;
    let config = load_config(cwd, paths)?;
    let store = open_store(paths)?;
    let drafts = DraftStore::new(&paths.drafts);
    let lock = config.lock_approved;

    match command {
        TermCommand::Row(args) => {
            let mut plan = drafts.resume(&store, &args.curriculum, lock)?;
            if !plan.rows().iter().any(|row| row.si_no == args.si_no) {
                plan.insert_row(TermRow::new(args.si_no))?;
            }
            for edit in row_edits(&args) {
                plan.update_row(args.si_no, edit)?;
            }
            drafts.store(&plan)?;
            print_plan(&plan, json!({ "status": "ok" }))
        }
        TermCommand::RemoveRow(args) => {
            let mut plan = drafts.resume(&store, &args.curriculum, lock)?;
            plan.remove_row(args.si_no)?;
            drafts.store(&plan)?;
            print_plan(&plan, json!({ "status": "ok" }))
        }
        TermCommand::Save(args) => {
            let mut plan = drafts.resume(&store, &args.curriculum, lock)?;
            let report = plan.save(&store)?;
            drafts.store(&plan)?;
            print_plan(&plan, json!({ "status": "ok", "save": report }))
        }
        TermCommand::Submit(args) => {
            let identity = identity(&config);
            let mut plan = drafts.resume(&store, &args.curriculum, lock)?;
            let outcome = plan.submit(&store, &identity)?;
            drafts.store(&plan)?;
            print_plan(&plan, json!({ "status": "ok", "submit": outcome }))
        }
        TermCommand::Status(args) => {
            if args.reload {
                drafts.discard(&args.curriculum)?;
            }
            let mut plan = drafts.resume(&store, &args.curriculum, lock)?;
            plan.notices_mut().clear();
            drafts.store(&plan)?;
            print_plan(&plan, json!({ "status": "ok" }))
        }
        TermCommand::Owner(args) => {
            store.set_program_owner(&args.curriculum, &args.user_id)?;
            print_json(&json!({
                "status": "ok",
                "curriculum": args.curriculum,
                "program_owner": args.user_id,
            }))
        }
        TermCommand::Review(args) => {
            let reviewer = identity(&config).current_user_id()?;
            let decision = match args.decision {
                DecisionArg::Approve => ReviewDecision::Approve,
                DecisionArg::Reject => ReviewDecision::Reject,
            };
            let status = store.record_review(&args.curriculum, &reviewer, decision)?;
            print_json(&json!({
                "status": "ok",
                "curriculum": args.curriculum,
                "approval_status": status.as_str(),
                "reviewed_by": reviewer,
            }))
        }
    }
}

fn row_edits(args: &RowArgs) -> Vec<RowEdit> {
    let mut edits = Vec::new();
    if let Some(name) = &args.name {
        edits.push(RowEdit::TermName(name.clone()));
    }
    if let Some(weeks) = args.weeks {
        edits.push(RowEdit::DurationWeeks(weeks));
    }
    if let Some(credits) = args.credits {
        edits.push(RowEdit::Credits(credits));
    }
    if let Some(theory) = args.theory {
        edits.push(RowEdit::TheoryCourseCount(theory));
    }
    if let Some(practical) = args.practical {
        edits.push(RowEdit::PracticalOtherCount(practical));
    }
    if let Some(start) = args.start_year {
        edits.push(RowEdit::AcademicStartYear(start));
    }
    if let Some(end) = args.end_year {
        edits.push(RowEdit::AcademicEndYear(end));
    }
    edits
}

fn print_plan(plan: &TermPlan, mut head: Value) -> Result<(), CliError> {
    if let Some(object) = head.as_object_mut() {
        object.insert("curriculum".into(), json!(plan.curriculum_id()));
        object.insert("state".into(), json!(plan.state().as_str()));
        object.insert("info".into(), serde_json::to_value(plan.info())?);
        object.insert("rows".into(), serde_json::to_value(plan.rows())?);
        object.insert("totals".into(), serde_json::to_value(plan.totals())?);
        object.insert("notices".into(), serde_json::to_value(plan.notices().active())?);
    }
    print_json(&head)
}

fn identity(config: &EffectiveConfig) -> ConfiguredIdentity {
    ConfiguredIdentity::resolve(config.user_id.clone(), std::env::var(USER_ENV).ok())
}

fn mapping_context(args: &ContextArgs) -> Result<MappingContext, CliError> {
    let pair = LevelPair::parse(&args.pair).ok_or_else(|| {
        CliError::new(
            "invalid_pair",
            format!("unknown level pair `{}`; use co-po or po-peo", args.pair),
        )
    })?;
    Ok(MappingContext::new(args.context.clone(), pair))
}

fn parse_level(raw: &str) -> Result<Level, CliError> {
    Level::parse(raw).ok_or_else(|| {
        CliError::new(
            "invalid_level",
            format!("unknown level `{raw}`; use co, po or peo"),
        )
    })
}

fn find_outcome(
    store: &SqliteStore,
    context: &str,
    key: &str,
) -> Result<curricula::outcome::Outcome, CliError> {
    store.find(context, key)?.ok_or_else(|| {
        CliError::with_kind(
            "outcome_not_found",
            ErrorKind::NotFound,
            format!("outcome `{key}` is not attached to `{context}`"),
        )
    })
}

fn load_config(cwd: &Path, paths: &RepoPaths) -> Result<EffectiveConfig, CliError> {
    Ok(load_effective_config(
        cwd,
        Some(&paths.repo_config),
        Some(&paths.user_config),
    )?)
}

fn open_store(paths: &RepoPaths) -> Result<SqliteStore, CliError> {
    Ok(SqliteStore::open(&path_string(&paths.index))?)
}

fn repo_paths(cwd: &Path, global: bool) -> Result<RepoPaths, CliError> {
    let home = home_dir()?;
    let (root, cache_root, mode) = if global {
        (
            home.join(".curricula"),
            home.join(".curricula-cache"),
            StorageMode::Global,
        )
    } else {
        (
            cwd.join(".curricula"),
            cwd.join(".curricula-cache"),
            StorageMode::RepoLocal,
        )
    };

    Ok(RepoPaths {
        index: root.join("curricula.sqlite"),
        drafts: cache_root.join("drafts"),
        repo_config: cwd.join(".curricula").join("config.yml"),
        user_config: home.join(".curricula").join("config.yml"),
        root,
        cache_root,
        mode,
    })
}

fn require_initialized_paths(paths: &RepoPaths) -> Result<(), CliError> {
    if !paths.root.exists() || !paths.index.exists() {
        return Err(CliError::new(
            "not_initialized",
            "repository is not initialized; run `curricula init`",
        ));
    }
    Ok(())
}

fn write_default_config(paths: &RepoPaths) -> Result<(), CliError> {
    let config_path = match paths.mode {
        StorageMode::RepoLocal => &paths.repo_config,
        StorageMode::Global => &paths.user_config,
    };
    if config_path.exists() {
        return Ok(());
    }
    let default = match paths.mode {
        StorageMode::RepoLocal => default_repo_config_yaml(),
        StorageMode::Global => default_global_config_yaml(),
    };
    replace_contents(config_path, default.as_bytes())
        .map_err(|err| CliError::io("write_error", err))
}

fn home_dir() -> Result<PathBuf, CliError> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| CliError::new("home_error", "HOME environment variable is not set"))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string(value)?;
    println!("{rendered}");
    Ok(())
}
