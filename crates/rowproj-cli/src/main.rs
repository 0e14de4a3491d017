//! rowproj CLI: validate, explain and run projection documents.

use clap::{Parser, Subcommand};
use rowproj_cli::doc::{apply_doc_config, compile, parse, Loaded, ProjectionDoc};
use rowproj_core::config::ProjectorConfig;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rowproj")]
#[command(about = "Compile and run optimized row projections", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a projection document parses and compiles
    Validate {
        /// Path to the projection YAML file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show the compiled steps for a projection (EXPLAIN)
    Explain {
        /// Path to the projection YAML file
        #[arg(short, long)]
        file: PathBuf,

        /// Keep one raw copy per field instead of merging adjacent copies
        #[arg(long)]
        no_coalesce: bool,
    },

    /// Project the document's source rows and print them as JSON lines
    Run {
        /// Path to the projection YAML file
        #[arg(short, long)]
        file: PathBuf,

        /// Keep one raw copy per field instead of merging adjacent copies
        #[arg(long)]
        no_coalesce: bool,

        /// Skip the per-row layout check
        #[arg(long)]
        no_verify: bool,
    },
}

#[derive(Debug, Default, Clone, Copy)]
struct Overrides {
    no_coalesce: bool,
    no_verify: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => validate(&file),
        Commands::Explain { file, no_coalesce } => explain(
            &file,
            Overrides {
                no_coalesce,
                ..Default::default()
            },
        ),
        Commands::Run {
            file,
            no_coalesce,
            no_verify,
        } => run(
            &file,
            Overrides {
                no_coalesce,
                no_verify,
            },
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Environment first, then the keys the document's `config:` block sets,
/// then CLI flags.
fn resolve_config(
    base: ProjectorConfig,
    doc: &ProjectionDoc,
    overrides: Overrides,
) -> ProjectorConfig {
    let mut config = base;
    if let Some(doc_config) = &doc.config {
        apply_doc_config(&mut config, doc_config);
    }
    if overrides.no_coalesce {
        config.coalesce = false;
    }
    if overrides.no_verify {
        config.verify_rows = false;
    }
    config
}

fn load_file(path: &PathBuf, overrides: Overrides) -> Result<Loaded, Box<dyn std::error::Error>> {
    let yaml_content = fs::read_to_string(path)?;
    let doc = parse(&yaml_content)?;
    let config = resolve_config(ProjectorConfig::from_env(), &doc, overrides);
    Ok(compile(&doc, config)?)
}

fn validate(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_file(path, Overrides::default())?;
    println!(
        "✓ Projection is valid ({} fields, {} steps)",
        loaded.projector.destination_indices().len(),
        loaded.projector.num_steps()
    );
    Ok(())
}

fn explain(path: &PathBuf, overrides: Overrides) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_file(path, overrides)?;
    print!("{}", loaded.explain()?);
    Ok(())
}

fn run(path: &PathBuf, overrides: Overrides) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_file(path, overrides)?;
    for row in loaded.project_rows()? {
        println!("{}", serde_json::to_string(&row)?);
    }
    Ok(())
}
