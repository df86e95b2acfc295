//! ImageAuth CLI - morph and near-duplicate detection for image registration.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;
use utils::Output;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  65  Image flagged (duplicate, or morph with --fail-on-morph)
  66  Input error (missing file, undecodable image, malformed hash)
  69  Ledger unavailable
  74  Corpus store or I/O error";

#[derive(Parser)]
#[command(name = "imageauth")]
#[command(author, version, about = "Morph and near-duplicate detection for image registration", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print machine-readable JSON instead of human output
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// When to colorize output
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the content hash, perceptual hash and descriptor summary of an image
    Fingerprint {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Compare two images the way the similarity matcher would
    Compare {
        /// Previously registered image
        #[arg(value_name = "A")]
        first: PathBuf,

        /// Candidate upload
        #[arg(value_name = "B")]
        second: PathBuf,

        /// Hamming distance below which the hash filter passes
        #[arg(long, default_value_t = imageauth_core::matcher::DEFAULT_PHASH_THRESHOLD)]
        phash_threshold: u32,

        /// Cosine similarity above which the descriptor confirms
        #[arg(long, default_value_t = imageauth_core::matcher::DEFAULT_DESCRIPTOR_THRESHOLD)]
        descriptor_threshold: f32,
    },

    /// Run detection against the corpus without registering anything
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// SQLite corpus URL
        #[arg(long, env = "DATABASE_URL")]
        db: String,

        /// ONNX morph classifier model
        #[arg(long, env = "MODEL_PATH")]
        model: Option<PathBuf>,

        /// Exit with code 65 when the image is a duplicate or a potential morph
        #[arg(long)]
        fail_on_morph: bool,
    },

    /// Detect, register on the ledger, and add to the corpus
    Register {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// SQLite corpus URL
        #[arg(long, env = "DATABASE_URL")]
        db: String,

        /// Ledger gateway base URL
        #[arg(long, env = "LEDGER_URL")]
        ledger_url: String,

        /// Ledger request timeout in seconds
        #[arg(long, default_value_t = 60)]
        ledger_timeout: u64,

        /// Free-text metadata recorded on the ledger
        #[arg(long, default_value = "")]
        metadata: String,

        /// ONNX morph classifier model
        #[arg(long, env = "MODEL_PATH")]
        model: Option<PathBuf>,
    },

    /// Look a content hash up on the ledger and in the corpus
    Verify {
        /// SHA-256 content hash (64 hex characters)
        #[arg(value_name = "HASH")]
        hash: String,

        /// SQLite corpus URL
        #[arg(long, env = "DATABASE_URL")]
        db: String,

        /// Ledger gateway base URL
        #[arg(long, env = "LEDGER_URL")]
        ledger_url: String,

        /// Ledger request timeout in seconds
        #[arg(long, default_value_t = 60)]
        ledger_timeout: u64,
    },
}

fn init_tracing(verbose: u8, quiet: bool, ansi: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "imageauth_core=info,imageauth=info,warn",
        (false, _) => "imageauth_core=debug,imageauth=debug,info",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let ansi = match cli.color {
        ColorChoice::Always => {
            colored::control::set_override(true);
            true
        }
        ColorChoice::Never => {
            colored::control::set_override(false);
            false
        }
        ColorChoice::Auto => std::io::stderr().is_terminal(),
    };
    init_tracing(cli.verbose, cli.quiet, ansi);

    let out = Output::new(cli.json, cli.quiet);

    let result = match cli.command {
        Commands::Fingerprint { file } => commands::fingerprint::execute(&file, &out),
        Commands::Compare {
            first,
            second,
            phash_threshold,
            descriptor_threshold,
        } => commands::compare::execute(
            &first,
            &second,
            phash_threshold,
            descriptor_threshold,
            &out,
        ),
        Commands::Check {
            file,
            db,
            model,
            fail_on_morph,
        } => commands::check::execute(&file, &db, model.as_deref(), fail_on_morph, &out).await,
        Commands::Register {
            file,
            db,
            ledger_url,
            ledger_timeout,
            metadata,
            model,
        } => {
            commands::register::execute(
                &file,
                &db,
                &ledger_url,
                ledger_timeout,
                &metadata,
                model.as_deref(),
                &out,
            )
            .await
        }
        Commands::Verify {
            hash,
            db,
            ledger_url,
            ledger_timeout,
        } => commands::verify::execute(&hash, &db, &ledger_url, ledger_timeout, &out).await,
    };

    if let Err(err) = result {
        let exit = ExitCode::from_anyhow(&err);
        eprintln!("{} {}", "error:".red().bold(), exit.message);
        std::process::exit(exit.code);
    }
}
