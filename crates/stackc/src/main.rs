use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;
use miette::{IntoDiagnostic, Report};
use stack_check::config::{Config, OutputFormat};
use stack_check::{annotate, check, format_source, repl, Source};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Diagnostic format: human or json
    #[arg(long, global = true)]
    format: Option<OutputFormat>,

    /// Extra configuration file, applied after the user and project files
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Maximum diagnostics shown per file, 0 for all
    #[arg(long, global = true)]
    error_limit: Option<usize>,

    #[arg(long, global = true)]
    warnings_as_errors: bool,

    #[arg(long, global = true)]
    no_color: bool,

    /// -v info, -vv debug, -vvv trace
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Verify operation streams and report diagnostics")]
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    #[command(about = "Emit the annotated stream as JSON")]
    Annotate {
        path: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    #[command(about = "Print a stream in canonical text form")]
    Fmt { path: PathBuf },
    #[command(about = "Interactive verification session")]
    Repl,
}

fn main() -> miette::Result<ExitCode> {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    let config = resolve_config(&cli)?;
    log::debug!("{:?}", config);

    match cli.command {
        Some(Commands::Check { paths }) => Ok(check_all(&paths, &config)),
        Some(Commands::Annotate { path, output }) => {
            let source = Source::from_file(&path)?;
            let report = check(&source, &config)?;
            if report.has_fatal() {
                eprint!("{}", report.render(&config)?);
            }
            let json = annotate(&report)?;
            match output {
                Some(out) => std::fs::write(&out, json).into_diagnostic()?,
                None => print!("{}", json),
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Fmt { path }) => {
            let source = Source::from_file(&path)?;
            print!("{}", format_source(&source, &config)?);
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Repl) | None => {
            repl::main_loop(config).into_diagnostic()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Checks every file, reporting all of them before deciding the exit code.
fn check_all(paths: &[PathBuf], config: &Config) -> ExitCode {
    let mut failed = false;
    for path in paths {
        match check_one(path, config) {
            Ok(fatal) => failed |= fatal,
            Err(report) => {
                eprintln!("{:?}", report);
                failed = true;
            }
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn check_one(path: &Path, config: &Config) -> miette::Result<bool> {
    let source = Source::from_file(path)?;
    let report = check(&source, config)?;
    let rendered = report.render(config)?;
    match config.format {
        OutputFormat::Json => print!("{}", rendered),
        OutputFormat::Human => eprint!("{}", rendered),
    }
    log::info!(
        "{}: {} diagnostic(s), {} fatal",
        report.name,
        report.program.diagnostics.len(),
        report.program.fatal_count()
    );
    Ok(report.has_fatal())
}

fn resolve_config(cli: &Cli) -> miette::Result<Config> {
    let cwd = std::env::current_dir().into_diagnostic()?;
    let mut config = Config::load(&cwd, cli.config.as_deref()).map_err(Report::new)?;
    if let Some(format) = cli.format {
        config.format = format;
    }
    if let Some(limit) = cli.error_limit {
        config.error_limit = limit;
    }
    if cli.warnings_as_errors {
        config.warnings_as_errors = true;
    }
    if cli.no_color {
        config.color = false;
    }
    Ok(config)
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}
