/*!
 * tabgen CLI - Completion Script Generator
 *
 * Generates bash completion scripts from JSON/YAML command tree
 * definitions, and resolves completion candidates in-process for
 * inspection and scripting.
 */

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tabgen_core::command_spec::{sample_spec, CommandSpec};
use tabgen_core::engine::CompletionEngine;
use tabgen_core::script_assembler;

#[derive(Parser)]
#[command(name = "tabgen_cli")]
#[command(about = "Completion Script Generator", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a completion script from a command tree definition
    Generate {
        /// Command tree definition file (JSON or YAML)
        #[arg(short, long, conflicts_with = "sample")]
        input: Option<PathBuf>,

        /// Use the built-in sample tree
        #[arg(long)]
        sample: bool,

        /// Output file (stdout if not provided)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve completion candidates for a partial command line
    Complete {
        /// Command tree definition file (JSON or YAML)
        #[arg(short, long, conflicts_with = "sample")]
        input: Option<PathBuf>,

        /// Use the built-in sample tree
        #[arg(long)]
        sample: bool,

        /// Partial command line, starting with the program name
        #[arg(short, long)]
        line: String,

        /// Index of the word being completed (defaults to the last word)
        #[arg(short, long)]
        cursor: Option<usize>,
    },

    /// Validate a command tree definition
    Validate {
        /// Command tree definition file (JSON or YAML)
        #[arg(short, long, conflicts_with = "sample")]
        input: Option<PathBuf>,

        /// Use the built-in sample tree
        #[arg(long)]
        sample: bool,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Generate {
            input,
            sample,
            output,
        } => generate(input, sample, output),
        Commands::Complete {
            input,
            sample,
            line,
            cursor,
        } => complete(input, sample, &line, cursor),
        Commands::Validate { input, sample } => validate(input, sample),
        Commands::Version => {
            println!("tabgen_cli v{}", env!("CARGO_PKG_VERSION"));
            println!("Completion Script Generator");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_spec(input: Option<PathBuf>, sample: bool) -> Result<CommandSpec> {
    match input {
        Some(path) => CommandSpec::from_file(path),
        None if sample => Ok(sample_spec()),
        None => bail!("either --input or --sample is required"),
    }
}

fn generate(input: Option<PathBuf>, sample: bool, output: Option<PathBuf>) -> Result<()> {
    let spec = load_spec(input, sample)?;
    match output {
        Some(path) => script_assembler::generate_to_file(&spec, &path)?,
        None => print!("{}", script_assembler::generate(&spec)?),
    }
    Ok(())
}

fn complete(
    input: Option<PathBuf>,
    sample: bool,
    line: &str,
    cursor: Option<usize>,
) -> Result<()> {
    let spec = load_spec(input, sample)?;
    let engine = CompletionEngine::compile(&spec)?;

    let mut words: Vec<String> = line.split_whitespace().map(str::to_string).collect();
    if words.is_empty() || line.ends_with(' ') {
        words.push(String::new());
    }
    let cursor = cursor.unwrap_or(words.len() - 1);

    for candidate in engine.complete(&words, cursor) {
        println!("{}", candidate);
    }
    Ok(())
}

fn validate(input: Option<PathBuf>, sample: bool) -> Result<()> {
    let spec = load_spec(input, sample)?;
    spec.validate()?;
    let walk = tabgen_core::tree_walker::TreeWalker::walk(&spec)?;
    println!("{}: ok ({} dispatch units)", spec.name, walk.identifiers.len());
    Ok(())
}
