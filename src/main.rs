use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fieldscribe")]
#[command(
    version,
    about = "AI-assisted field inspection report generator with human review"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize FieldScribe in the current directory
    Init {
        #[arg(long, short, help = "Overwrite existing initialization")]
        force: bool,
    },

    /// Start or resume report generation
    Generate {
        #[arg(help = "Report identifier")]
        report_id: String,
        #[arg(long, help = "JSON file of photo notes: [{photo_id, note}, ...]")]
        notes: Option<PathBuf>,
        #[arg(long, help = "Structure rules for the report plan")]
        rules: Option<String>,
    },

    /// Show run status
    Status {
        #[arg(help = "Report identifier")]
        report_id: Option<String>,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
        #[arg(long, help = "List suspended runs past the staleness threshold")]
        stale: bool,
    },

    /// Approve a report awaiting review
    Approve {
        #[arg(help = "Report identifier")]
        report_id: String,
    },

    /// Request a revision of a report awaiting review
    Revise {
        #[arg(help = "Report identifier")]
        report_id: String,
        #[arg(long, help = "What to change")]
        feedback: String,
    },

    /// Cancel a report awaiting review
    Cancel {
        #[arg(help = "Report identifier")]
        report_id: String,
    },

    /// Edit one section directly
    Edit {
        #[arg(help = "Report identifier")]
        report_id: String,
        #[arg(help = "Section identifier (shown in export output)")]
        section_id: String,
        #[arg(long, help = "New section content")]
        content: Option<String>,
        #[arg(long, help = "New section heading")]
        heading: Option<String>,
        #[arg(long, help = "Expected section version for conflict detection")]
        expect_version: Option<i64>,
    },

    /// Send a conversational message about a report
    Chat {
        #[arg(help = "Report identifier")]
        report_id: String,
        #[arg(help = "The message")]
        message: String,
    },

    /// Accept a staged suggestion
    Accept {
        #[arg(help = "Report identifier")]
        report_id: String,
        #[arg(help = "Message id of the staged suggestion")]
        message_id: String,
    },

    /// Reject a staged suggestion
    Reject {
        #[arg(help = "Report identifier")]
        report_id: String,
        #[arg(help = "Message id of the staged suggestion")]
        message_id: String,
    },

    /// Export the report as markdown
    Export {
        #[arg(help = "Report identifier")]
        report_id: String,
        #[arg(long, short, help = "Write to file instead of stdout")]
        output: Option<PathBuf>,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mFieldScribe encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }

        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    use fieldscribe::cli::commands;

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
        Commands::Generate {
            report_id,
            notes,
            rules,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::generate::run(
                &report_id,
                notes.as_deref(),
                rules.as_deref(),
            ))?;
        }
        Commands::Status {
            report_id,
            format,
            stale,
        } => {
            commands::status::run(report_id.as_deref(), &format, stale)?;
        }
        Commands::Approve { report_id } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::decision::approve(&report_id))?;
        }
        Commands::Revise {
            report_id,
            feedback,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::decision::revise(&report_id, &feedback))?;
        }
        Commands::Cancel { report_id } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::decision::cancel(&report_id))?;
        }
        Commands::Edit {
            report_id,
            section_id,
            content,
            heading,
            expect_version,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::edit::run(
                &report_id,
                &section_id,
                content.as_deref(),
                heading.as_deref(),
                expect_version,
            ))?;
        }
        Commands::Chat { report_id, message } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::chat::send(&report_id, &message))?;
        }
        Commands::Accept {
            report_id,
            message_id,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::chat::accept(&report_id, &message_id))?;
        }
        Commands::Reject {
            report_id,
            message_id,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::chat::reject(&report_id, &message_id))?;
        }
        Commands::Export { report_id, output } => {
            commands::export::run(&report_id, output.as_deref())?;
        }
    }

    Ok(())
}
