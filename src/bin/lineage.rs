//! Schema Lineage CLI
//!
//! Inspects the built-in kinds and runs payload files through their lineages.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use schema_lineage::{
    kinds, Codec, Kind, LineageConfig, SyntacticVersion, Translator, VersionDetector,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-lineage")]
#[command(about = "Inspect kind lineages and translate payloads between schema versions")]
struct Cli {
    /// Config file (defaults to lineage.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered kinds
    Kinds,

    /// List the schema versions of a kind
    Versions {
        /// Kind name
        kind: String,
        /// Print each schema's declaration
        #[arg(long)]
        declarations: bool,
    },

    /// Detect the schema version of a payload
    Detect {
        /// Kind name
        kind: String,
        /// Payload file
        file: PathBuf,
    },

    /// Translate a payload to another schema version
    Translate {
        /// Kind name
        kind: String,
        /// Payload file
        file: PathBuf,
        /// Target version (defaults to the kind's current version)
        #[arg(short, long)]
        to: Option<String>,
        /// Write the translated payload here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = LineageConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let registry = kinds::registry().context("building kind registry")?;

    match cli.command {
        Commands::Kinds => {
            for kind in registry.kinds() {
                let meta = kind.meta();
                println!(
                    "{:<12} {:<13} current {:<6} latest {:<6} {}",
                    meta.name,
                    meta.maturity,
                    meta.current_version,
                    kind.lineage().latest_version(),
                    kind.fingerprint().short()
                );
            }
            Ok(())
        }

        Commands::Versions { kind, declarations } => {
            let kind = registry.get(&kind)?;
            for schema in kind.lineage().schemas() {
                let marker = if schema.version() == kind.meta().current_version { " (current)" } else { "" };
                println!("v{}{}", schema.version(), marker);
                if declarations {
                    println!("{}", serde_json::to_string_pretty(&schema.declaration())?);
                }
            }
            Ok(())
        }

        Commands::Detect { kind, file } => {
            let kind = registry.get(&kind)?;
            let (codec, data) = read_payload(&config, kind, &file)?;
            let version = VersionDetector::new(kind.lineage(), codec.version_field(), config.detection.tie_break)
                .detect(&data)?;
            println!("v{}", version);
            Ok(())
        }

        Commands::Translate { kind, file, to, output } => {
            let kind = registry.get(&kind)?;
            let (codec, mut data) = read_payload(&config, kind, &file)?;
            let lineage = kind.lineage();

            let from = VersionDetector::new(lineage, codec.version_field(), config.detection.tie_break)
                .detect(&data)?;
            let to = match to {
                Some(v) => SyntacticVersion::parse(&v)?,
                None => kind.meta().current_version,
            };
            if let Some(path) = codec.version_field() {
                path.remove(&mut data);
            }

            let translation = Translator::new(lineage)
                .translate(data, from, to)
                .with_context(|| format!("translating {} from v{} to v{}", file.display(), from, to))?;

            for lacuna in &translation.lacunas {
                eprintln!("⚠️  {}", lacuna);
            }

            let mut value = translation.value;
            if let Some(path) = codec.version_field() {
                path.insert(&mut value, to.to_json())?;
            }
            let bytes = codec.from_structured(&value)?;

            if let Some(path) = output {
                std::fs::write(&path, &bytes)?;
                println!("✅ v{} -> v{} written to {:?}", from, to, path);
            } else {
                println!("{}", String::from_utf8_lossy(&bytes));
            }
            Ok(())
        }
    }
}

fn read_payload(config: &LineageConfig, kind: &Kind, file: &Path) -> Result<(impl Codec, Value)> {
    let codec = config.json_codec(&format!("{}.json", kind.name()))?;
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let data = codec.to_structured(&bytes)?;
    Ok((codec, data))
}
