//! Protocol generator CLI
//!
//! Generates a C header and implementation from a YAML protocol document.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use protogen::driver::{self, RunOptions};
use protogen::{Error, ErrorClass, GeneratorConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "protogen")]
#[command(version)]
#[command(about = "Generate C vtables, constructors and an arena from a protocol document")]
struct Cli {
    /// Protocol document (YAML)
    input: PathBuf,

    /// Header file to write
    #[arg(short = 'H', long)]
    header: Option<PathBuf>,

    /// Implementation file to write
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Generator configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the resolved dispatch table as JSON
    #[arg(long)]
    dump_dispatch: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                exit_code(ErrorClass::Usage)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.diagnostic(&cli.input));
            exit_code(e.class())
        }
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    let config = GeneratorConfig::load_from(cli.config.as_deref())?;
    let options = RunOptions {
        input: cli.input.clone(),
        header: cli.header.clone(),
        output: cli.output.clone(),
        dump_dispatch: cli.dump_dispatch.clone(),
    };
    driver::run(&options, &config)?;
    Ok(())
}

fn exit_code(class: ErrorClass) -> ExitCode {
    ExitCode::from(class.exit_code() as u8)
}
