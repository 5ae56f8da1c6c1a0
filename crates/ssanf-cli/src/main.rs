//! ssanf: SSA to A-normal form and back

use clap::{Parser, Subcommand};
use ssanf_cli::{read_back, report_parse_error, transform, write_outputs, Config, PipelineError};
use ssanf_ssa::{pretty_print, PrintStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ssanf")]
#[command(version)]
#[command(about = "Convert control-flow graphs to SSA and A-normal form", long_about = None)]
struct Cli {
    /// Log pipeline progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build SSA and ANF from a control-flow graph in JSON
    Transform {
        /// Control-flow graph file
        file: PathBuf,

        /// Output directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Render with ASCII keywords
        #[arg(long)]
        ascii: bool,

        /// Also write the ANF text with provenance info
        #[arg(long)]
        prov_info: bool,

        /// Read the provenance text back and write the rebuilt SSA
        #[arg(long)]
        parse_back: bool,

        /// Emit one flat block group per scope
        #[arg(long)]
        no_nest: bool,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the SSA encoded by an ANF file with provenance info
    Parse {
        /// ANF text file
        file: PathBuf,

        /// Render with ASCII keywords
        #[arg(long)]
        ascii: bool,
    },
    /// Validate an ANF file with provenance info
    Check {
        /// ANF text file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Transform {
            file,
            out_dir,
            ascii,
            prov_info,
            parse_back,
            no_nest,
            config,
        } => {
            let mut config = match config {
                Some(path) => match Config::from_file(&path) {
                    Ok(config) => config,
                    Err(e) => {
                        eprintln!("Error reading config '{}': {}", path.display(), e);
                        return ExitCode::FAILURE;
                    }
                },
                None => Config::new(),
            };
            if let Some(dir) = out_dir {
                config.out_dir = dir;
            }
            config.ascii |= ascii;
            config.prov_info |= prov_info;
            config.parse_back |= parse_back;
            config.nest_blocks &= !no_nest;
            transform_file(&file, &config)
        }
        Commands::Parse { file, ascii } => parse_file(&file, ascii),
        Commands::Check { file } => check_file(&file),
    }
}

/// RUST_LOG wins over the verbose flag
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn read_file(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(s) => Some(s),
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            None
        }
    }
}

fn transform_file(path: &Path, config: &Config) -> ExitCode {
    let Some(source) = read_file(path) else {
        return ExitCode::FAILURE;
    };

    let cfg = match ssanf_cfg::from_json(&source) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading '{}': {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let outputs = match transform(&cfg, config) {
        Ok(outputs) => outputs,
        Err(PipelineError::Parse { error, text }) => {
            report(&config.anf_with_prov_path().display().to_string(), &text, &error);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match write_outputs(&outputs, config) {
        Ok(written) => {
            for path in written {
                println!("Wrote {}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error writing outputs: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_file(path: &Path, ascii: bool) -> ExitCode {
    let Some(source) = read_file(path) else {
        return ExitCode::FAILURE;
    };

    match read_back(&source) {
        Ok(program) => {
            let style = if ascii { PrintStyle::Ascii } else { PrintStyle::Symbolic };
            print!("{}", pretty_print(&program, style));
            ExitCode::SUCCESS
        }
        Err(e) => {
            fail(path, &source, e);
            ExitCode::FAILURE
        }
    }
}

fn check_file(path: &Path) -> ExitCode {
    let Some(source) = read_file(path) else {
        return ExitCode::FAILURE;
    };

    match read_back(&source) {
        Ok(program) => {
            println!(
                "Check passed: {} ({} procedures, {} blocks)",
                path.display(),
                program.procedures.len(),
                program.blocks.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            fail(path, &source, e);
            ExitCode::FAILURE
        }
    }
}

fn fail(path: &Path, source: &str, error: PipelineError) {
    match error {
        PipelineError::Parse { error, .. } => report(&path.display().to_string(), source, &error),
        other => eprintln!("Error in '{}': {}", path.display(), other),
    }
}

fn report(filename: &str, source: &str, error: &ssanf_parser::ParseError) {
    if report_parse_error(filename, source, error).is_err() {
        eprintln!("{}: {}", filename, error);
    }
}
