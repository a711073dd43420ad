//! easyml CLI Module
//!
//! Command-line access to a workspace: file management, training and prediction.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::AppConfig;
use crate::data::ColumnRole;
use crate::selection::{
    Algorithm, AlgorithmSelector, ParameterBag, AUTOMATIC_CODE, AUTOMATIC_NAME, CLASSIFICATION,
    REGRESSION,
};
use crate::service::{MessageLevel, Workspace};

/// Workspace directory used when neither the flags, the config file nor the
/// environment name one
pub const DEFAULT_WORKSPACE_DIR: &str = ".easyml";

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString    { s.truecolor(235, 110, 110) }

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_err(msg: &str) {
    println!("  {} {}", bad("✗"), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "easyml")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and compare classic ML models on uploaded CSV files")]
#[command(long_about = None)]
pub struct Cli {
    /// Workspace directory holding the record store
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Owner the commands act for
    #[arg(long, global = true)]
    pub owner: Option<String>,

    /// Seed for splits and estimators
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a CSV file
    Upload {
        /// CSV file to upload
        csv: PathBuf,

        /// Column to mark as the target
        #[arg(long)]
        target: Option<String>,

        /// Columns to ignore during training
        #[arg(long)]
        ignore: Vec<String>,
    },

    /// List uploaded files
    Files,

    /// Rename a file
    Rename {
        id: u64,
        name: String,
    },

    /// Delete a file with its models
    Delete {
        id: u64,
    },

    /// Set the role of a column (input, target, ignore)
    Role {
        file: u64,
        column: String,
        role: String,
    },

    /// Train a model on a file
    Train {
        file: u64,

        /// Algorithm code or name (0 or "automatic" for a best-of search)
        #[arg(short, long)]
        algorithm: String,

        /// Training parameter as key=value, repeatable
        #[arg(short, long = "param")]
        params: Vec<String>,
    },

    /// List trained models
    Models {
        /// Only models trained on this file
        #[arg(long)]
        file: Option<u64>,
    },

    /// Predict the rows of a file with a stored model
    Predict {
        model: u64,
        file: u64,
    },

    /// List algorithm codes
    Algorithms,
}

impl Cli {
    /// Configuration from defaults, the config file, the environment and the flags, in that order
    pub fn app_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        }
        .with_env_overrides()?;

        if let Some(dir) = &self.workspace {
            config = config.with_workspace_dir(dir);
        } else if config.workspace_dir.is_none() {
            config = config.with_workspace_dir(DEFAULT_WORKSPACE_DIR);
        }
        if let Some(owner) = &self.owner {
            config = config.with_owner(owner.as_str());
        }
        if self.seed.is_some() {
            let engine = config.engine.clone().with_random_state(self.seed);
            config = config.with_engine(engine);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Run one command; fails when the workspace reported an error
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.app_config()?;
    let owner = config.owner.clone();
    let ws = Workspace::open(config)?;

    match cli.command {
        Commands::Upload { csv, target, ignore } => cmd_upload(&ws, &owner, &csv, target.as_deref(), &ignore),
        Commands::Files => cmd_files(&ws, &owner),
        Commands::Rename { id, name } => {
            ws.rename_file(&owner, id, &name);
        }
        Commands::Delete { id } => {
            ws.delete_file(&owner, id);
        }
        Commands::Role { file, column, role } => {
            let role: ColumnRole = role.parse()?;
            ws.set_column_role(&owner, file, &column, role);
        }
        Commands::Train { file, algorithm, params } => cmd_train(&ws, &owner, file, &algorithm, &params)?,
        Commands::Models { file } => cmd_models(&ws, &owner, file),
        Commands::Predict { model, file } => cmd_predict(&ws, &owner, model, file),
        Commands::Algorithms => cmd_algorithms(),
    }

    print_messages(&ws)
}

fn print_messages(ws: &Workspace) -> anyhow::Result<()> {
    let messages = ws.messages().drain();
    let failed = messages.iter().any(|m| m.level == MessageLevel::Error);
    if !messages.is_empty() {
        println!();
    }
    for message in messages {
        match message.level {
            MessageLevel::Error | MessageLevel::Warning => step_err(&message.text),
            _ => step_ok(&message.text),
        }
    }
    if failed {
        anyhow::bail!("command failed");
    }
    Ok(())
}

pub fn cmd_upload(
    ws: &Workspace,
    owner: &str,
    csv: &Path,
    target: Option<&str>,
    ignore: &[String],
) {
    let Some(file) = ws.upload_csv(owner, csv) else {
        return;
    };
    if let Some(target) = target {
        ws.set_column_role(owner, file.id, target, ColumnRole::Target);
    }
    for column in ignore {
        ws.set_column_role(owner, file.id, column, ColumnRole::Ignore);
    }

    section("Uploaded");
    println!("  {}", kv("id      ", &file.id.to_string()));
    println!("  {}", kv("name    ", &file.display_name));
    println!("  {}", kv("columns ", &file.columns.len().to_string()));
}

pub fn cmd_files(ws: &Workspace, owner: &str) {
    section("Files");
    let files = ws.files(owner);
    if files.is_empty() {
        println!("  {}", dim("no files uploaded"));
        return;
    }
    for file in files {
        println!(
            "  {} {}  {}",
            accent(&format!("#{:<4}", file.id)),
            file.display_name.white().bold(),
            dim(&file.created_at.format("%Y-%m-%d %H:%M").to_string())
        );
        for column in &file.columns {
            println!(
                "        {} {} ({})",
                muted(&format!("{:>3}", column.column_num)),
                column.header,
                column.role
            );
        }
    }
}

pub fn cmd_train(
    ws: &Workspace,
    owner: &str,
    file: u64,
    algorithm: &str,
    params: &[String],
) -> anyhow::Result<()> {
    let selector: AlgorithmSelector = algorithm.parse()?;
    let mut bag = ParameterBag::new();
    for pair in params {
        bag.insert_pair(pair)?;
    }

    section("Training");
    println!("  {}", kv("algorithm", selector.display_name()));
    println!("  {}", kv("file     ", &file.to_string()));

    let start = Instant::now();
    if let Some(record) = ws.train_model(owner, selector.code(), file, &bag) {
        println!();
        println!("  {}", kv("model    ", &record.display_name));
        println!("  {}", kv(&format!("{:<9}", record.accuracy_type), &record.accuracy.to_string()));
        println!("  {}", kv("elapsed  ", &format!("{:.2?}", start.elapsed())));
    }
    Ok(())
}

pub fn cmd_models(ws: &Workspace, owner: &str, file: Option<u64>) {
    section("Models");
    let models = ws.models(owner, file);
    if models.is_empty() {
        println!("  {}", dim("no models trained"));
        return;
    }
    for model in models {
        println!(
            "  {} {}  {} {}",
            accent(&format!("#{:<4}", model.id)),
            model.display_name.white().bold(),
            muted(&model.accuracy_type),
            model.accuracy
        );
        println!("        {}", dim(&model.parameters));
    }
}

pub fn cmd_predict(ws: &Workspace, owner: &str, model: u64, file: u64) {
    let Some(predictions) = ws.predict(owner, model, file) else {
        return;
    };
    section("Predictions");
    for p in predictions {
        println!("  {} {}", muted(&format!("row {:>5}", p.row_num)), p.value);
    }
}

pub fn cmd_algorithms() {
    section("Algorithms");
    println!("  {} {}", accent(&format!("{:>3}", AUTOMATIC_CODE)), AUTOMATIC_NAME);
    for alg in Algorithm::ALL {
        println!("  {} {}", accent(&format!("{:>3}", alg.code())), alg.display_name());
    }

    section("Automatic families (auto_alg_type)");
    let names = |members: &[Algorithm]| {
        members.iter().map(|a| a.display_name()).collect::<Vec<_>>().join(", ")
    };
    println!("  {}", kv("auto_classification", &names(CLASSIFICATION)));
    println!("  {}", kv("auto_regression    ", &names(REGRESSION)));
}
