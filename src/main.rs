//! Archive Manifest CLI
//!
//! Entry point for the `archive-manifest` command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use archive_manifest::inventory::resolve_output_path;
use archive_manifest::manifest::LayerOrigin;
use archive_manifest::{
    load_layered, validate, ExpandError, Expander, InventoryDocument, LoadedManifest,
    OutputFormat, Override, ResolvedRecord, RetrievalMethod,
};

#[derive(Parser)]
#[command(name = "archive-manifest")]
#[command(about = "Expand archival manifests into inventory records", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a manifest into an inventory file
    Expand {
        /// Path to the manifest (YAML, TOML or JSON)
        manifest: PathBuf,

        /// Output file; its extension is replaced by the format's
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Output format (json, jsonl)
        #[arg(long, default_value = "json")]
        format: OutputFormat,

        #[command(flatten)]
        layers: LayerArgs,

        /// Seed for identifiers and sample draws (reproducible output)
        #[arg(long)]
        seed: Option<u64>,

        /// Print the inventory to stdout instead of writing a file
        #[arg(long)]
        stdout: bool,
    },

    /// Check a manifest without expanding it
    Validate {
        /// Path to the manifest (YAML, TOML or JSON)
        manifest: PathBuf,

        #[command(flatten)]
        layers: LayerArgs,
    },
}

#[derive(clap::Args)]
struct LayerArgs {
    /// Site defaults merged beneath the manifest
    #[arg(long, short = 'd', env = "ARCHIVE_MANIFEST_DEFAULTS")]
    defaults: Option<PathBuf>,

    /// Override a manifest field (key=value, repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<Override>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Expand {
            manifest,
            output,
            format,
            layers,
            seed,
            stdout,
        } => {
            run_expand(&manifest, output.as_deref(), format, &layers, seed, stdout);
        }
        Commands::Validate { manifest, layers } => {
            run_validate(&manifest, &layers);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(manifest: &Path, layers: &LayerArgs) -> LoadedManifest {
    match load_layered(manifest, layers.defaults.as_deref(), &layers.overrides) {
        Ok(loaded) => loaded,
        Err(e) => exit_with(&ExpandError::from(e)),
    }
}

fn exit_with(err: &ExpandError) -> ! {
    eprintln!("Error: {}", err);
    match err {
        ExpandError::Invalid(_) => process::exit(2),
        _ => process::exit(1),
    }
}

fn run_expand(
    manifest_path: &Path,
    output: Option<&Path>,
    format: OutputFormat,
    layers: &LayerArgs,
    seed: Option<u64>,
    stdout: bool,
) {
    let loaded = load(manifest_path, layers);

    let mut expander = match seed {
        Some(seed) => Expander::with_seed(seed),
        None => Expander::from_entropy(),
    };
    let records: Vec<ResolvedRecord> = match expander.expand(&loaded.manifest) {
        Ok(records) => records,
        Err(e) => exit_with(&e),
    };

    let document = InventoryDocument::new(records, loaded.sources);

    if stdout {
        let rendered = match document.render(format) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        };
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(rendered.as_bytes()) {
            eprintln!("Error writing to stdout: {}", e);
            process::exit(1);
        }
        return;
    }

    let path = resolve_output_path(output, format);
    if let Err(e) = document.write_to_file(&path, format) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
    println!("Inventory written to {} ({} records).", path.display(), document.records.len());
}

fn run_validate(manifest_path: &Path, layers: &LayerArgs) {
    let loaded = load(manifest_path, layers);

    match validate(&loaded.manifest) {
        Ok(policy) => {
            if let Err(e) = policy.method.parse::<RetrievalMethod>() {
                exit_with(&ExpandError::from(e));
            }

            println!("Manifest valid: {}", manifest_path.display());
            println!();
            println!("  Objects: {}", policy.names.len());
            println!("  Method: {}", policy.method);
            println!("  Vault: {}", policy.vault);
            println!("  Application: {}", policy.application);
            match policy.verification_destination {
                Some(dest) => println!("  Verification: {} (sample: {})", dest, policy.sample),
                None => println!("  Verification: disabled"),
            }
            for source in &loaded.sources {
                let origin = match source.origin {
                    LayerOrigin::Defaults => "defaults",
                    LayerOrigin::Manifest => "manifest",
                    LayerOrigin::Cli => "cli",
                };
                match &source.path {
                    Some(path) => println!("  Layer: {} ({})", origin, path),
                    None => println!("  Layer: {}", origin),
                }
            }
        }
        Err(failure) => exit_with(&ExpandError::Invalid(failure)),
    }
}
