//! recast CLI - convert NDJSON records with a YAML rule document
//!
//! Reads one JSON object per line, runs the rules over each and writes the
//! converted records. Dropped records are left out of the output.

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use recast::{EngineConfig, OutputFormat, Outcome, RecordWriter, Rule, RuleEngine, RuleSource};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recast")]
#[command(
    version,
    about = "Declarative record transformation driven by YAML rules",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert NDJSON records
    Convert {
        /// Path to the rule document (YAML or JSON)
        #[arg(short, long)]
        rules: PathBuf,

        /// Input NDJSON file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (ndjson, json)
        #[arg(short, long, default_value = "ndjson")]
        format: OutputFormat,

        /// Engine settings file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Lower-case all keys before converting
        #[arg(long)]
        lower_case_keys: bool,

        /// Remove top-level null values from converted records
        #[arg(long)]
        drop_null_values: bool,
    },

    /// Load a rule document and list its rules without converting anything
    Validate {
        /// Path to the rule document (YAML or JSON)
        #[arg(short, long)]
        rules: PathBuf,
    },
}

fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Convert {
            rules,
            input,
            output,
            format,
            config,
            lower_case_keys,
            drop_null_values,
        } => resolve_config(config, lower_case_keys, drop_null_values)
            .and_then(|config| convert(rules, input, output, format, config)),
        Commands::Validate { rules } => validate(rules),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Build engine settings with precedence: CLI flag > ENV > config file > default
fn resolve_config(
    config_path: Option<PathBuf>,
    lower_case_keys: bool,
    drop_null_values: bool,
) -> Result<EngineConfig, String> {
    let mut config = match config_path {
        Some(path) => EngineConfig::load_from_file(&path)
            .map_err(|e| format!("Failed to load config {}: {}", path.display(), e))?,
        None => EngineConfig::default(),
    };

    if let Some(value) = env_flag("RECAST_KEYS_IN_LOWER_CASE")? {
        config.keys_in_lower_case = value;
    }
    if let Some(value) = env_flag("RECAST_DROP_NULL_VALUES")? {
        config.drop_null_values = value;
    }

    if lower_case_keys {
        config.keys_in_lower_case = true;
    }
    if drop_null_values {
        config.drop_null_values = true;
    }

    Ok(config)
}

fn env_flag(name: &str) -> Result<Option<bool>, String> {
    match std::env::var(name) {
        Ok(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" | "" => Ok(Some(false)),
            other => Err(format!("Invalid value for {}: '{}'", name, other)),
        },
        Err(_) => Ok(None),
    }
}

fn convert(
    rules_path: PathBuf,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    format: OutputFormat,
    config: EngineConfig,
) -> Result<(), String> {
    let rules = RuleSource::from_file(&rules_path)
        .rules()
        .map_err(|e| format!("Failed to load rules from {}: {}", rules_path.display(), e))?;
    tracing::info!("Loaded {} rules from {}", rules.len(), rules_path.display());

    let engine = RuleEngine::new(rules).with_config(config);

    let reader: Box<dyn BufRead> = match &input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).map_err(|e| format!("Failed to open {}: {}", path.display(), e))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let sink: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).map_err(|e| format!("Failed to create {}: {}", path.display(), e))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let mut writer = RecordWriter::new(sink, format).map_err(|e| e.to_string())?;
    let mut converted = 0usize;
    let mut dropped = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("Failed to read input: {}", e))?;
        if line.trim().is_empty() {
            continue;
        }

        let record = match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(serde_json::Value::Object(record)) => record,
            Ok(_) => return Err(format!("Line {}: expected a JSON object", index + 1)),
            Err(e) => return Err(format!("Line {}: invalid JSON: {}", index + 1, e)),
        };

        match engine.process(record).map_err(|e| format!("Line {}: {}", index + 1, e))? {
            Outcome::Converted(record) => {
                writer.write(&record).map_err(|e| e.to_string())?;
                converted += 1;
            }
            Outcome::Dropped => dropped += 1,
        }
    }

    writer.finish().map_err(|e| e.to_string())?;
    tracing::info!("Converted {} records, dropped {}", converted, dropped);

    Ok(())
}

fn validate(rules_path: PathBuf) -> Result<(), String> {
    println!("🔍 Validating {}...", rules_path.display());

    let rules = RuleSource::from_file(&rules_path)
        .rules()
        .map_err(|e| format!("Validation failed: {}", e))?;

    for (key, rule) in rules.iter() {
        match rule {
            Rule::Object(object) => {
                println!("  ✓ {} ({} -> {})", key, rule.kind(), object.type_name)
            }
            Rule::Inert => println!("  ℹ {} (ignored)", key),
            _ => println!("  ✓ {} ({})", key, rule.kind()),
        }
    }

    println!("✨ {} rules valid", rules.len());
    Ok(())
}
