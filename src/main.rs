use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use sigscan::hash::logging::{init_tracing, init_tracing_json};
use sigscan::hash::{
    DigestEngine, DigestSet, Precedence, RegistryLoader, ScanConfig, ScanEvent, ScanResult,
    ScanState, ScanStats, SignatureRegistry,
};

#[derive(Parser)]
#[command(name = "sigscan", version, about = "Classify files by digest against a signature registry")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the regular files directly inside a directory
    Scan(ScanArgs),
    /// Print the MD5, SHA-1 and SHA-256 digests of a file or text
    Hash {
        /// File to digest
        #[arg(required_unless_present = "text")]
        file: Option<PathBuf>,
        /// Digest this text instead of a file
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
    },
    /// Inspect signature registry files
    #[command(subcommand)]
    Registry(RegistryCommand),
}

#[derive(Args)]
struct ScanArgs {
    /// Directory to scan
    dir: PathBuf,
    /// Config file (defaults to <config dir>/sigscan/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Signature registry file (.txt, .json, optionally .xz)
    #[arg(long)]
    registry: Option<PathBuf>,
    /// Number of files digested at once
    #[arg(short, long)]
    jobs: Option<usize>,
    /// Read size in bytes
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Digest order for conflicting matches: strongest-first or legacy-first
    #[arg(long)]
    precedence: Option<Precedence>,
    /// Print a JSON report instead of verdict lines
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum RegistryCommand {
    /// Validate a registry file
    Check { file: PathBuf },
    /// Write the builtin registry as text
    Export { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.log_json {
        init_tracing_json(cli.verbose);
    } else {
        init_tracing(cli.verbose);
    }

    let result = match cli.command {
        Command::Scan(args) => run_scan(args),
        Command::Hash { file, text } => run_hash(file.as_deref(), text.as_deref()),
        Command::Registry(cmd) => run_registry(cmd),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            ExitCode::from(2)
        }
    }
}

fn run_scan(args: ScanArgs) -> Result<ExitCode> {
    let mut config = ScanConfig::discover(args.config.as_deref())?;
    if let Some(registry) = args.registry {
        config.registry = Some(registry);
    }
    if let Some(jobs) = args.jobs {
        config.concurrency = jobs;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(precedence) = args.precedence {
        config.precedence = precedence;
    }

    // Registry problems are fatal before any file is touched
    let registry = config.load_registry().context("loading signature registry")?;
    let mut engine = config.build_engine(registry);

    if args.json {
        let report = engine.scan_all(&args.dir)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(exit_code_for(&report.stats));
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files | {msg}")?
            .progress_chars("=>-"),
    );
    let pb_events = pb.clone();
    engine = engine.with_event_callback(move |event| match event {
        ScanEvent::Started { total } => pb_events.set_length(*total as u64),
        ScanEvent::Progress(progress) => {
            pb_events.set_position(progress.current as u64);
            pb_events.set_message(progress.current_file.clone());
        }
        _ => {}
    });

    let mut run = engine.scan(&args.dir)?;
    if run.is_empty() {
        pb.finish_and_clear();
        println!("The folder is empty.");
        return Ok(ExitCode::SUCCESS);
    }

    for result in run.by_ref() {
        pb.println(verdict_line(&result));
    }
    pb.finish_and_clear();

    let stats = run.stats();
    if run.state() == ScanState::Cancelled {
        println!("{}", "Scan cancelled".yellow());
    } else {
        println!("{}", "Scan complete!".green().bold());
    }
    print_summary(&stats);
    Ok(exit_code_for(&stats))
}

fn verdict_line(result: &ScanResult) -> String {
    match (&result.error, result.is_malicious()) {
        (Some(reason), _) => format!(
            "{} --> {} ({})",
            result.file_name,
            result.label.to_string().dimmed(),
            reason
        ),
        (None, true) => format!("{} --> {}", result.file_name, result.label.to_string().red().bold()),
        (None, false) => format!("{} --> {}", result.file_name, result.label.to_string().green()),
    }
}

fn print_summary(stats: &ScanStats) {
    println!("Files scanned: {}", stats.files_processed);
    println!("Files failed: {}", stats.files_failed);
    println!("Malicious: {}", stats.files_malicious);
    println!("Total bytes: {}", format_size(stats.total_bytes, BINARY));
    println!("Duration: {:.2}s", stats.duration.as_secs_f64());
}

fn exit_code_for(stats: &ScanStats) -> ExitCode {
    if stats.files_malicious > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn run_hash(file: Option<&Path>, text: Option<&str>) -> Result<ExitCode> {
    let engine = DigestEngine::new();
    let digests: DigestSet = match (file, text) {
        (_, Some(text)) => engine.compute_digests_bytes(text.as_bytes()),
        (Some(file), None) => engine.compute_digests(file)?,
        (None, None) => anyhow::bail!("pass a file or --text"),
    };
    println!("md5     {}", digests.md5);
    println!("sha1    {}", digests.sha1);
    println!("sha256  {}", digests.sha256);
    Ok(ExitCode::SUCCESS)
}

fn run_registry(cmd: RegistryCommand) -> Result<ExitCode> {
    match cmd {
        RegistryCommand::Check { file } => {
            let registry = RegistryLoader::load(&file)?;
            println!("{}: {} signatures OK", file.display(), registry.len());
        }
        RegistryCommand::Export { file } => {
            let registry = SignatureRegistry::builtin();
            RegistryLoader::save(&file, &registry)?;
            println!("Wrote {} signatures to {}", registry.len(), file.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}
