use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use camino::Utf8Path;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use meta_retrieve::archive;
use meta_retrieve::config::{ConfigLoader, ConfigOverrides};
use meta_retrieve::error::RetrieveError;
use meta_retrieve::fs_util::LocalFs;
use meta_retrieve::output::{ConsoleOutput, JsonOutput, OutputMode};
use meta_retrieve::platform::PlatformClient;
use meta_retrieve::retrieve::{ProgressSink, Retriever};

#[derive(Parser)]
#[command(name = "meta-retrieve")]
#[command(about = "Retrieve metadata from a remote site into a local directory")]
#[command(version, author)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long, global = true, help = "Print a JSON summary instead of text")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Retrieve metadata from a site into a local directory")]
    Retrieve(RetrieveArgs),
    #[command(about = "Pack a directory into a ZIP archive")]
    Pack(PackArgs),
}

#[derive(Args)]
struct RetrieveArgs {
    #[arg(long)]
    host: Option<String>,

    #[arg(short = 'd', long)]
    target_dir: Option<String>,

    #[arg(long)]
    api_version: Option<String>,

    #[arg(long)]
    config: Option<String>,
}

#[derive(Args)]
struct PackArgs {
    source: PathBuf,

    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<RetrieveError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RetrieveError) -> u8 {
    match error {
        RetrieveError::ConfigRead(_)
        | RetrieveError::ConfigParse(_)
        | RetrieveError::MissingSetting(_) => 2,
        RetrieveError::Transport(_)
        | RetrieveError::TransportStatus { .. }
        | RetrieveError::PlanDecode(_) => 3,
        RetrieveError::ArchiveOpen(_) | RetrieveError::Merge(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    match cli.command {
        Commands::Retrieve(args) => run_retrieve(args, output_mode, cli.verbose),
        Commands::Pack(args) => run_pack(args, output_mode),
    }
}

fn run_retrieve(args: RetrieveArgs, output_mode: OutputMode, verbose: bool) -> miette::Result<()> {
    let console = ConsoleOutput { verbose };
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Text => &console,
        OutputMode::Json => &JsonOutput,
    };
    if output_mode == OutputMode::Text {
        println!("Running command: Retrieve Metadata");
    }

    let overrides = ConfigOverrides {
        host: args.host,
        api_version: args.api_version,
        target_dir: args.target_dir,
    };
    let config = ConfigLoader::resolve(args.config.as_deref(), overrides)?;
    let client = PlatformClient::new(&config)?;
    let start = Instant::now();

    if output_mode == OutputMode::Text {
        console.section("Getting Retrieve Plan");
    }
    let plans = client.fetch_plan()?;
    tracing::info!(plans = plans.len(), "received retrieve plan");

    if output_mode == OutputMode::Text {
        console.section("Executing Retrieve Plan");
    }
    let mut retriever =
        Retriever::new(config.target_dir.clone(), config.metadata_dirs.clone(), LocalFs);
    if let Some(dir) = &config.spool_dir {
        retriever = retriever.with_spool_dir(dir.clone());
    }
    let summary = retriever.retrieve_all(&plans, &client, sink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_summary(&summary)
            .map_err(|err| RetrieveError::Filesystem(err.to_string()))?,
        OutputMode::Text => {
            console.print_summary(&summary, &display_target(retriever.target_root()));
            let message = "Successfully retrieved metadata from site";
            if verbose {
                println!("{message} ({:.2}s)", start.elapsed().as_secs_f64());
            } else {
                println!("{message}.");
            }
        }
    }
    Ok(())
}

fn run_pack(args: PackArgs, output_mode: OutputMode) -> miette::Result<()> {
    let file = File::create(&args.output).map_err(|err| {
        RetrieveError::ArchiveWrite(format!("create {}: {err}", args.output.display()))
    })?;
    if let Err(err) = archive::archive(&args.source, BufWriter::new(file)) {
        let _ = std::fs::remove_file(&args.output);
        return Err(err.into());
    }
    if output_mode == OutputMode::Text {
        println!(
            "Packed {} into {}",
            args.source.display(),
            args.output.display()
        );
    }
    Ok(())
}

fn display_target(target: &Utf8Path) -> String {
    std::path::absolute(target.as_std_path())
        .map(|path| path.display().to_string())
        .unwrap_or_else(|_| target.to_string())
}
