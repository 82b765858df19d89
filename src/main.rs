//! CLI entry point for `sheetmail`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};

use sheetmail::config::{self, Config};
use sheetmail::mail::imap::ImapTransport;
use sheetmail::mail::SmtpSender;
use sheetmail::model::credentials::MailCredentials;
use sheetmail::model::workorder::{
    check_text, InterventionTime, PatchMode, SinoffCode, WorkOrderFields,
};
use sheetmail::parser::mime::AttachmentFilter;
use sheetmail::server::{self, AppState};
use sheetmail::store::WorkDir;

#[derive(Parser)]
#[command(
    name = "sheetmail",
    version,
    about = "Fill in work-order spreadsheets received by email"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (default)
    Serve {
        /// Address to listen on, overriding the configuration
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
    /// List unread work-order messages as JSON
    Scan {
        /// Mailbox login
        #[arg(long, value_name = "ADDR")]
        user: String,
        #[arg(long, env = "SHEETMAIL_PASSWORD", hide_env_values = true)]
        password: String,
        /// Attachment filename prefix
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Fill in a local spreadsheet. The input file is left untouched.
    Patch {
        file: PathBuf,
        #[arg(long)]
        sinoff: i64,
        /// Intervention start, YYYY-MM-DDTHH:MM
        #[arg(long, value_parser = parse_timestamp)]
        start: NaiveDateTime,
        /// Intervention end, YYYY-MM-DDTHH:MM
        #[arg(long, value_parser = parse_timestamp)]
        end: NaiveDateTime,
        #[arg(long)]
        solution: String,
        /// Also overwrite the details cell
        #[arg(long)]
        details: Option<String>,
        /// Output directory (defaults to the working directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the details cell of a spreadsheet
    Details { file: PathBuf },
    /// Remove stale files from the working directory
    Sweep,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        None => cmd_serve(config, None),
        Some(Commands::Serve { bind }) => cmd_serve(config, bind),
        Some(Commands::Scan {
            user,
            password,
            prefix,
            host,
            port,
        }) => {
            let creds = MailCredentials::new(
                user,
                password,
                host.unwrap_or_else(|| config.mail.imap_host.clone()),
                port.unwrap_or(config.mail.imap_port),
            );
            cmd_scan(&config, &creds, prefix.as_deref())
        }
        Some(Commands::Patch {
            file,
            sinoff,
            start,
            end,
            solution,
            details,
            output,
        }) => {
            let fields = WorkOrderFields::new(
                SinoffCode::new(sinoff)?,
                InterventionTime::from(start),
                InterventionTime::from(end),
                solution,
            )?;
            let mode = match details.as_deref().map(str::trim) {
                Some(d) if !d.is_empty() => {
                    check_text("details", d)?;
                    PatchMode::DetailsAndSolution(d.to_string())
                }
                _ => PatchMode::SolutionOnly,
            };
            let out_dir = output.unwrap_or_else(|| config::work_dir(&config));
            cmd_patch(&file, &fields, &mode, &out_dir)
        }
        Some(Commands::Details { file }) => cmd_details(&file),
        Some(Commands::Sweep) => cmd_sweep(&config),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "sheetmail.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .map_err(|e| format!("expected YYYY-MM-DDTHH:MM: {e}"))
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("starting async runtime")
}

fn cmd_serve(config: Config, bind: Option<String>) -> anyhow::Result<()> {
    let workdir = WorkDir::open(config::work_dir(&config))?;
    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    let state = AppState::new(
        ImapTransport::new(&config.mail),
        Arc::new(SmtpSender::new(&config.mail)),
        workdir,
        config,
    );
    runtime()?.block_on(server::serve(state, &addr))
}

fn cmd_scan(config: &Config, creds: &MailCredentials, prefix: Option<&str>) -> anyhow::Result<()> {
    let transport = ImapTransport::new(&config.mail);
    let filter = AttachmentFilter::from_config(&config.scan, prefix);
    let summaries = runtime()?.block_on(sheetmail::mailbox::scan(
        &transport,
        creds,
        &config.mail.folder,
        &filter,
    ))?;
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}

/// Copy `file` into `out_dir` and patch the copy, so the caller's file survives.
fn cmd_patch(
    file: &Path,
    fields: &WorkOrderFields,
    mode: &PatchMode,
    out_dir: &Path,
) -> anyhow::Result<()> {
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("workorder.xlsx");

    let workdir = WorkDir::open(out_dir)?;
    let copy = workdir.write_new(name, &data)?;
    let output = sheetmail::sheet::patch(&copy.path, fields, mode)?;
    println!("{}", output.display());
    Ok(())
}

fn cmd_details(file: &Path) -> anyhow::Result<()> {
    match sheetmail::sheet::read_details(file)? {
        Some(details) => println!("{details}"),
        None => eprintln!("{}: details cell is empty", file.display()),
    }
    Ok(())
}

fn cmd_sweep(config: &Config) -> anyhow::Result<()> {
    let workdir = WorkDir::open(config::work_dir(config))?;
    let removed = workdir.sweep(config.server.file_max_age())?;
    println!("Removed {removed} file(s) from {}", workdir.root().display());
    Ok(())
}
