use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
};

use clap::{Parser, Subcommand};
use log::{debug, error};
use qltext::{Configuration, Error, FontDirectory, LabelService, RasterSummary, Target};

/// Render text labels for Brother QL printers.
#[derive(Parser)]
#[command(name = "ql-label-text", version, about)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    configuration: Option<PathBuf>,

    /// DEBUG, INFO, WARNING, ERROR or a RUST_LOG filter. DEBUG also turns
    /// print jobs into debug traces.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Printer target, overrides `printer.printer` of the configuration
    #[arg(short, long, global = true)]
    target: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a label, e.g. `print font_family="DejaVu Sans (Book)" text=Hello`
    Print {
        /// Report a trace instead of sending to the printer
        #[arg(long)]
        debug: bool,
        #[arg(value_parser = parse_pair)]
        parameters: Vec<(String, String)>,
    },
    /// Render a PNG preview
    Preview {
        /// png or base64
        #[arg(long, default_value = "png")]
        return_format: String,
        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(value_parser = parse_pair)]
        parameters: Vec<(String, String)>,
    },
    /// List the fonts found in the font folders
    Fonts,
    /// List the supported label sizes
    Labels,
    /// Summarize a raster file, e.g. one captured from a printer target
    Inspect { file: PathBuf },
}

fn parse_pair(arg: &str) -> Result<(String, String), String> {
    arg.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", arg))
}

/// Python style level names are accepted alongside `log` filters.
fn log_filter(level: &str) -> String {
    match level.to_ascii_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => level.to_string(),
    }
}

fn init_logger(level: Option<&str>) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}:{}] {} - {}",
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.level(),
            record.args()
        )
    });
    if let Some(level) = level {
        builder.parse_filters(&log_filter(level));
    }
    builder.init();
}

fn run(cli: Cli) -> Result<ExitCode, Error> {
    let config = match &cli.configuration {
        Some(path) => Configuration::from_path(path)?,
        None => Configuration::default(),
    };
    let level = cli.log_level.clone().or_else(|| config.server.log_level.clone());
    init_logger(level.as_deref());
    let trace_by_default = level
        .as_deref()
        .map(|l| l.eq_ignore_ascii_case("DEBUG"))
        .unwrap_or(false);

    let config = Arc::new(config);
    let fonts = Arc::new(FontDirectory::scan(&config.font_folders()));
    let service = LabelService::new(Arc::clone(&config), fonts);
    let target = cli.target.as_deref().map(Target::parse).transpose()?;

    match cli.command {
        Command::Print { debug, parameters } => {
            let raw: HashMap<String, String> = parameters.into_iter().collect();
            let response = service.print_to(&raw, target.as_ref(), debug || trace_by_default);
            println!("{}", response.to_json()?);
            Ok(if response.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Preview {
            return_format,
            output,
            parameters,
        } => {
            let mut raw: HashMap<String, String> = parameters.into_iter().collect();
            raw.insert("return_format".to_string(), return_format);
            let bytes = service.preview(&raw)?;
            match output {
                Some(path) => {
                    fs::write(&path, &bytes)?;
                    debug!("wrote preview to {}", path.display());
                }
                None => io::stdout().write_all(&bytes)?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Fonts => {
            for (family, style) in service.fonts().fonts() {
                println!("{} ({})", family, style);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Labels => {
            for id in config.labels.identifiers() {
                if let Some(label) = config.labels.get(id) {
                    println!(
                        "{:<8} {:>3} x {:>3} mm  {:>4} x {:>4} dots  {:?}",
                        id,
                        label.tape_mm.0,
                        label.tape_mm.1,
                        label.dots_printable.width,
                        label.dots_printable.length,
                        label.form_factor
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Inspect { file } => {
            let summary = RasterSummary::parse(&fs::read(&file)?)?;
            println!(
                "raster mode: {}, compressed: {}, pages: {}",
                summary.raster_mode,
                summary.compressed,
                summary.pages.len()
            );
            for (n, page) in summary.pages.iter().enumerate() {
                println!(
                    "page {}: media {:#04x}, {} x {} mm, {} of {} rows, {} bytes per row{}",
                    n + 1,
                    page.media_type,
                    page.width_mm,
                    page.length_mm,
                    page.rows.len(),
                    page.declared_rows,
                    page.rows.first().map(Vec::len).unwrap_or(0),
                    if page.last { ", last" } else { "" }
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err);
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
