use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use planrag::config::{Config, DEFAULT_CONFIG_PATH};
use planrag::db::IndexStore;
use planrag::embedder::create_embedder;
use planrag::formatter::{self, ExportFormat};
use planrag::generator::OllamaGenerator;
use planrag::indexer::{BuildOptions, BuildReport, BuildStatus, IndexBuilder};
use planrag::plan::{PlanGenerator, PlanSettings, PlanStore, TestPlanRequest};
use planrag::retriever::Retriever;

/// Retrieval-augmented test-plan generator.
#[derive(Parser)]
#[command(name = "planrag", version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index of every project under the input root.
    ///
    /// Each immediate subdirectory is one project. Exits nonzero if any
    /// project failed to build.
    Build {
        /// Input root (overrides `input_dir`).
        #[arg(long)]
        input: Option<PathBuf>,

        /// Build only this project.
        #[arg(long)]
        project: Option<String>,
    },

    /// Print the top-scoring chunks of a project for a query.
    Search {
        #[arg(long)]
        project: String,

        #[arg(long)]
        query: String,

        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Generate a test plan for a project module.
    Generate {
        #[arg(long)]
        project: String,

        #[arg(long)]
        module: String,

        /// Retrieval query (defaults to `prompt.query`).
        #[arg(long)]
        query: Option<String>,

        /// Output root (overrides `output_dir`).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Also export to xlsx, docx, pdf or all. Repeatable.
        #[arg(long = "export")]
        exports: Vec<String>,
    },

    /// Convert a generated markdown plan to office formats.
    Export {
        file: PathBuf,

        /// xlsx, docx, pdf or all.
        #[arg(long, default_value = "all")]
        format: Vec<String>,
    },

    /// Write a configuration file with every default filled in.
    InitConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        path: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_formats(names: &[String]) -> Result<Vec<ExportFormat>> {
    let mut formats = Vec::new();
    for name in names {
        for format in ExportFormat::parse_list(name)? {
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
    }
    Ok(formats)
}

fn load_config(path: &str) -> Result<Config> {
    let config = Config::load(path)?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn print_report(report: &BuildReport) {
    let files = format!(
        "{} files loaded, {} skipped, {} failed",
        report.loaded_files, report.skipped_files, report.failed_files
    );
    match report.status {
        BuildStatus::Built => println!(
            "{}: ok ({}/{} chunks embedded, {} failed; {files})",
            report.project, report.embedded, report.chunks, report.failed
        ),
        BuildStatus::Empty => println!("{}: empty ({files})", report.project),
    }
}

fn cmd_build(config: &Config, input: Option<PathBuf>, project: Option<String>) -> Result<ExitCode> {
    let input_root = input.unwrap_or_else(|| config.input_root());
    let store = IndexStore::new(config.index_root());
    let embedder = create_embedder(&config.embedder)?;
    let builder = IndexBuilder::new(&store, &*embedder, BuildOptions::from(config))?;

    let outcomes = match project {
        Some(name) => {
            let dir = input_root.join(&name);
            let outcome = builder.build_project_dir(&name, &dir);
            vec![(name, outcome)]
        }
        None => builder
            .build_all(&input_root)
            .with_context(|| format!("failed to list projects in {}", input_root.display()))?,
    };

    if outcomes.is_empty() {
        warn!("No project directories under {}", input_root.display());
    }

    let mut failed = 0;
    for (name, outcome) in &outcomes {
        match outcome {
            Ok(report) => print_report(report),
            Err(e) => {
                failed += 1;
                println!("{name}: failed: {e}");
            }
        }
    }
    info!(
        "{} projects built, {failed} failed",
        outcomes.len() - failed
    );

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_search(config: &Config, project: &str, query: &str, top_k: Option<usize>) -> Result<()> {
    let store = IndexStore::new(config.index_root());
    let embedder = create_embedder(&config.embedder)?;
    let hits = Retriever::new(&store, &*embedder).retrieve(
        project,
        query,
        top_k.unwrap_or(config.search_top_k),
    )?;

    for (rank, hit) in hits.iter().enumerate() {
        let page = hit
            .chunk
            .page
            .map(|p| format!(" p.{p}"))
            .unwrap_or_default();
        println!(
            "{:>2}. [{:.4}] {}{page} @{}",
            rank + 1,
            hit.score,
            hit.chunk.source_path,
            hit.chunk.offset
        );
        println!("    {}", hit.chunk.text.replace('\n', " "));
    }
    Ok(())
}

fn cmd_generate(
    config: &Config,
    request: TestPlanRequest,
    output: Option<PathBuf>,
    exports: &[String],
) -> Result<ExitCode> {
    // Formats are checked before any retrieval or model call.
    let formats = parse_formats(exports)?;
    let settings = PlanSettings::from_config(config)?;

    let store = IndexStore::new(config.index_root());
    let embedder = create_embedder(&config.embedder)?;
    let generator = OllamaGenerator::new(&config.generator)?;
    let plans = PlanGenerator::new(
        Retriever::new(&store, &*embedder),
        &generator,
        PlanStore::new(output.unwrap_or_else(|| config.output_root())),
        settings,
    );

    let plan = plans.generate(&request)?;
    if plan.chunks_dropped > 0 {
        warn!(
            "{} of {} retrieved chunks did not fit the context budget",
            plan.chunks_dropped,
            plan.chunks_used + plan.chunks_dropped
        );
    }
    println!("{}", plan.path.display());

    if formats.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    match formatter::export_all(&plan.path, &formats) {
        Ok(paths) => {
            for path in paths {
                println!("{}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Export failed, markdown kept at {}: {e}", plan.path.display());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn cmd_export(file: &Path, formats: &[String]) -> Result<()> {
    let formats = parse_formats(formats)?;
    let paths = formatter::export_all(file, &formats)
        .with_context(|| format!("failed to export {}", file.display()))?;
    for path in paths {
        println!("{}", path.display());
    }
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::InitConfig { path } => {
            Config::default().save(&path)?;
            println!("{path}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Export { file, format } => {
            cmd_export(&file, &format)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Build { input, project } => {
            let config = load_config(&cli.config)?;
            cmd_build(&config, input, project)
        }
        Commands::Search {
            project,
            query,
            top_k,
        } => {
            let config = load_config(&cli.config)?;
            cmd_search(&config, &project, &query, top_k)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Generate {
            project,
            module,
            query,
            output,
            exports,
        } => {
            let config = load_config(&cli.config)?;
            let request = TestPlanRequest {
                project,
                module,
                query: query.unwrap_or_else(|| config.prompt.query.clone()),
            };
            cmd_generate(&config, request, output, &exports)
        }
    }
}
