// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// labelbridge: send label images to serial and network thermal printers.
//
// Entry point.  Initialises logging, loads the config, wires the services,
// and runs one CLI command or the JSON-lines loop.

mod protocol;
mod services;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use labelbridge_core::error::Result;
use labelbridge_core::human_errors::humanize_error;
use labelbridge_core::{JobStatus, LabelBridgeError, LabelImageFormat, PrintJob, PrintSettings};
use labelbridge_raster::sample_label;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use protocol::BridgeResponse;
use services::app_services::AppServices;

/// Label-printing bridge for ESC/POS thermal label printers
#[derive(Parser, Debug)]
#[command(name = "labelbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: $LABELBRIDGE_CONFIG, then the data directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover printers on every enabled driver
    Printers,

    /// Query a printer's status
    Status {
        /// Logical printer name, e.g. Serial-/dev/ttyUSB0
        printer: String,
    },

    /// Check that a printer answers
    Test {
        printer: String,
    },

    /// Print an image file as a label
    Print {
        /// PNG, JPEG, BMP or GIF file
        file: PathBuf,

        #[arg(long)]
        printer: String,

        /// Label width in mm (defaults to the configured label)
        #[arg(long)]
        width_mm: Option<f64>,

        /// Label height in mm (defaults to the configured label)
        #[arg(long)]
        height_mm: Option<f64>,

        #[arg(long, default_value = "1")]
        copies: u32,

        /// Feed three lines instead of cutting
        #[arg(long)]
        no_cut: bool,
    },

    /// Print the built-in test label
    Sample {
        #[arg(long)]
        printer: String,

        #[arg(long)]
        width_mm: Option<f64>,

        #[arg(long)]
        height_mm: Option<f64>,
    },

    /// Answer JSON-lines requests on stdin until EOF
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout belongs to command output and `serve`.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    debug!(?cli, "labelbridge starting");

    let services = match AppServices::init(cli.config).await {
        Ok(services) => services,
        Err(e) => {
            report(&e);
            return ExitCode::FAILURE;
        }
    };

    debug!(config = %services.config_path().display(), "services ready");

    let code = match run(&services, cli.command).await {
        Ok(code) => code,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    };
    services.shutdown().await;
    code
}

async fn run(services: &AppServices, command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Printers => {
            let printers = services.dispatcher().list_printers().await;
            if printers.is_empty() {
                println!("No printers found.");
            }
            for name in printers {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Status { printer } => {
            let status = services.dispatcher().get_status(&printer).await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(if status.online {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Test { printer } => {
            if services.dispatcher().test_printer(&printer).await {
                println!("{printer}: ok");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("{printer}: not reachable");
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Print {
            file,
            printer,
            width_mm,
            height_mm,
            copies,
            no_cut,
        } => {
            let image = tokio::fs::read(&file).await?;
            let mut settings = label_settings(services, printer, width_mm, height_mm);
            settings.copies = copies.max(1);
            settings.auto_cut = !no_cut;

            let job = PrintJob::new(job_name(&file), image, format_of(&file), settings);
            finish(services.print_and_wait(job).await?)
        }

        Commands::Sample {
            printer,
            width_mm,
            height_mm,
        } => {
            let settings = label_settings(services, printer, width_mm, height_mm);
            let image = sample_label(settings.width_mm, settings.height_mm)?;
            let job = PrintJob::new("Sample label", image, LabelImageFormat::Png, settings);
            finish(services.print_and_wait(job).await?)
        }

        Commands::Serve => {
            serve(services).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// One request per stdin line, one response per stdout line.  Requests are
/// answered in order; `enqueue` is the non-blocking way to print.
async fn serve(services: &AppServices) -> Result<()> {
    info!("serving JSON-lines requests on stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match protocol::parse_line(&line) {
            Ok(request) => services.handle(request).await,
            Err(e) => BridgeResponse::error(&e),
        };
        let mut out = response.to_line();
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }
    info!("stdin closed");
    Ok(())
}

fn label_settings(
    services: &AppServices,
    printer: String,
    width_mm: Option<f64>,
    height_mm: Option<f64>,
) -> PrintSettings {
    let default = services.config().default_label;
    PrintSettings::new(
        printer,
        width_mm.unwrap_or(default.width_mm),
        height_mm.unwrap_or(default.height_mm),
    )
}

fn format_of(file: &Path) -> LabelImageFormat {
    file.extension()
        .and_then(|ext| ext.to_str())
        .and_then(LabelImageFormat::from_extension)
        .unwrap_or_default()
}

fn job_name(file: &Path) -> String {
    file.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Label".to_owned())
}

fn finish(job: PrintJob) -> Result<ExitCode> {
    match job.status {
        JobStatus::Completed => {
            println!("Printed {} on {} ({})", job.name, job.settings.printer_name, job.id);
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            let reason = job.error_message.as_deref().unwrap_or("no error recorded");
            eprintln!("Job {} ended {:?}: {reason}", job.id, job.status);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report(err: &LabelBridgeError) {
    let human = humanize_error(err);
    eprintln!("Error: {}", human.message);
    eprintln!("  {}", human.suggestion);
    debug!(error = %err, "command failed");
}
