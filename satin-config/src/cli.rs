use crate::{
    dependencies::DependencyGraph,
    diff::{diff_documents, summarize},
    merge::merge_documents,
    preset::PresetStore,
    schema::SchemaRegistry,
    settings::SatinSettings,
    storage::FileStorage,
    validator::{Validator, ValidatorOptions},
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use satin_core::{document::read_document, ConfigDocument};
use satin_logging::TracingLogger;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "satin-config")]
#[command(about = "Schema validation and preset management for Satin")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a document against a registered schema
    Validate {
        /// Document to validate (JSON, or YAML by extension)
        file: PathBuf,

        /// Schema name
        #[arg(short, long)]
        schema: String,

        /// Directory of schema files (defaults to schemas.path from settings)
        #[arg(long)]
        schemas: Option<PathBuf>,

        /// Report fields the schema does not declare
        #[arg(long)]
        strict: bool,
    },

    /// Show structural differences between two documents
    Diff {
        /// Old document
        a: PathBuf,

        /// New document
        b: PathBuf,
    },

    /// Deep-merge documents; later files win
    Merge {
        /// Base document
        base: PathBuf,

        /// Update documents, applied in order
        #[arg(required = true)]
        updates: Vec<PathBuf>,

        /// Output format
        #[arg(short = 'f', long, default_value = "yaml")]
        format: OutputFormat,
    },

    /// Manage versioned presets
    Preset {
        /// Preset store directory (defaults to storage.path from settings)
        #[arg(long, global = true)]
        store: Option<PathBuf>,

        #[command(subcommand)]
        action: PresetCommand,
    },

    /// Report references between stored presets
    Deps {
        /// Preset store directory (defaults to storage.path from settings)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Dependency keys (defaults to dependencies.keys from settings)
        #[arg(long, num_args = 1..)]
        keys: Option<Vec<String>>,

        /// Print the graph in Graphviz DOT format instead of a report
        #[arg(long)]
        dot: bool,
    },
}

#[derive(Subcommand)]
pub enum PresetCommand {
    /// Save a document as the next version of a preset
    Save { name: String, file: PathBuf },

    /// Print a preset's parameters
    Load {
        name: String,

        /// Version to load (latest when omitted)
        #[arg(long)]
        version: Option<u32>,

        /// Output format
        #[arg(short = 'f', long, default_value = "yaml")]
        format: OutputFormat,
    },

    /// List presets with their latest version
    List,

    /// Delete every version of a preset
    Delete { name: String },

    /// List the stored versions of a preset
    History { name: String },

    /// Save an old version again as the latest
    Rollback { name: String, version: u32 },

    /// Find presets whose keys or string values mention a keyword
    Search { keyword: String },
}

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Yaml,
    Json,
    JsonPretty,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            "json-pretty" => Ok(OutputFormat::JsonPretty),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

pub fn execute(args: Args) -> Result<()> {
    let settings = SatinSettings::load().context("Failed to load Satin settings")?;

    match args.command {
        Command::Validate {
            file,
            schema,
            schemas,
            strict,
        } => {
            let registry = SchemaRegistry::new(TracingLogger::shared());
            let schemas_dir = schemas.unwrap_or_else(|| settings.schemas_dir());
            registry
                .load_dir(&schemas_dir)
                .with_context(|| format!("Failed to load schemas from {:?}", schemas_dir))?;

            let document = load_document(&file)?;
            let options = ValidatorOptions {
                strict: strict || settings.validation.strict,
            };
            let validator = Validator::with_options(options, TracingLogger::shared());
            let result = validator.validate_named(&registry, &schema, &document)?;

            print!("{}", result);
            if !result.is_valid() {
                bail!(
                    "{:?} failed validation against '{}' with {} error(s)",
                    file,
                    schema,
                    result.errors().len()
                );
            }
        }

        Command::Diff { a, b } => {
            let old = load_document(&a)?;
            let new = load_document(&b)?;
            let entries = diff_documents(&old, &new);
            for entry in &entries {
                println!("{}", entry);
            }
            println!("{}", summarize(&entries));
        }

        Command::Merge {
            base,
            updates,
            format,
        } => {
            let mut merged = load_document(&base)?;
            for path in updates {
                let update = load_document(&path)?;
                merged = merge_documents(&merged, &update);
            }
            output(&merged, &format)?;
        }

        Command::Preset { store, action } => {
            let store = open_store(store.unwrap_or_else(|| settings.storage_dir()));
            run_preset(&store, action)?;
        }

        Command::Deps { store, keys, dot } => {
            let store = open_store(store.unwrap_or_else(|| settings.storage_dir()));
            let keys = keys.unwrap_or_else(|| settings.dependencies.keys.clone());
            let graph = DependencyGraph::from_store(&store, &keys)?;

            if dot {
                print!("{}", graph.to_dot());
                return Ok(());
            }

            for (source, targets) in graph.edges() {
                let targets: Vec<&str> = targets.iter().map(String::as_str).collect();
                println!("{} -> {}", source, targets.join(", "));
            }
            let summary = graph.summary();
            println!(
                "\n{} preset(s), max {} dependencies, max {} dependents, depth {}",
                summary.total_presets,
                summary.max_dependencies,
                summary.max_dependents,
                summary.max_depth
            );
            let isolated = graph.isolated();
            if !isolated.is_empty() {
                let names: Vec<&str> = isolated.iter().map(String::as_str).collect();
                println!("Isolated: {}", names.join(", "));
            }
            for cycle in graph.cycles() {
                println!("⚠️  Cycle: {}", cycle.join(" -> "));
            }
        }
    }

    Ok(())
}

fn run_preset(store: &PresetStore, action: PresetCommand) -> Result<()> {
    match action {
        PresetCommand::Save { name, file } => {
            let document = load_document(&file)?;
            let preset = store.save(&name, document)?;
            println!("✅ Saved {}", preset);
        }

        PresetCommand::Load {
            name,
            version,
            format,
        } => {
            let preset = store.load(&name, version)?;
            output(&preset.parameters, &format)?;
        }

        PresetCommand::List => {
            let presets = store.list()?;
            if presets.is_empty() {
                println!("No presets stored");
            }
            for summary in presets {
                println!(
                    "{:<32} v{:<5} {}",
                    summary.name,
                    summary.latest_version,
                    summary.modified_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        PresetCommand::Delete { name } => {
            store.delete(&name)?;
            println!("🗑️  Deleted '{}'", name);
        }

        PresetCommand::History { name } => {
            for version in store.history(&name)? {
                let preset = store.load(&name, Some(version))?;
                println!(
                    "v{:<5} {}",
                    version,
                    preset.metadata.modified_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        PresetCommand::Rollback { name, version } => {
            let preset = store.rollback(&name, version)?;
            println!("✅ Restored v{} of '{}' as v{}", version, name, preset.version);
        }

        PresetCommand::Search { keyword } => {
            for name in store.search(&keyword)? {
                println!("{}", name);
            }
        }
    }
    Ok(())
}

fn open_store(dir: PathBuf) -> PresetStore {
    PresetStore::new(Arc::new(FileStorage::new(dir)), TracingLogger::shared())
}

fn load_document(path: &Path) -> Result<ConfigDocument> {
    read_document(path).with_context(|| format!("Failed to load document: {:?}", path))
}

fn output<T: Serialize>(value: &T, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Yaml => {
            let yaml = serde_yaml_ng::to_string(value)?;
            print!("{}", yaml);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string(value)?;
            println!("{}", json);
        }
        OutputFormat::JsonPretty => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
        }
    }
    Ok(())
}
