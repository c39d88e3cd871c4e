use dbbridge::config::default_config_path;
use dbbridge::core::db::{open_client, QueryOutput, SqliteDriver};
use dbbridge::logging::init_logging;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

const USAGE: &str = "Usage: dbbridge [--config PATH] [--format rows|table|csv|json|markdown] [--log-file PATH] <profile> <query>";

/// How query results are printed.
#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Rows,
    Table,
    Csv,
    Json,
    Markdown,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "rows" => Some(OutputFormat::Rows),
            "table" => Some(OutputFormat::Table),
            "csv" => Some(OutputFormat::Csv),
            "json" => Some(OutputFormat::Json),
            "markdown" | "md" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }

    fn export_name(self) -> Option<&'static str> {
        match self {
            OutputFormat::Csv => Some("csv"),
            OutputFormat::Json => Some("json"),
            OutputFormat::Markdown => Some("markdown"),
            OutputFormat::Rows | OutputFormat::Table => None,
        }
    }
}

/// Parsed command line.
#[derive(Debug, PartialEq)]
struct CliArgs {
    config: Option<PathBuf>,
    format: OutputFormat,
    log_file: Option<PathBuf>,
    profile: String,
    query: String,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut config = None;
    let mut format = OutputFormat::Rows;
    let mut log_file = None;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = iter.next().ok_or("--config requires a path")?;
                config = Some(PathBuf::from(value));
            }
            "--format" | "-f" => {
                let value = iter.next().ok_or("--format requires a value")?;
                format = OutputFormat::parse(value).ok_or_else(|| format!("Unknown format: '{}'", value))?;
            }
            "--log-file" => {
                let value = iter.next().ok_or("--log-file requires a path")?;
                log_file = Some(PathBuf::from(value));
            }
            flag if flag.starts_with("--") => return Err(format!("Unknown option: '{}'", flag)),
            _ => positional.push(arg.clone()),
        }
    }

    match <[String; 2]>::try_from(positional) {
        Ok([profile, query]) => Ok(CliArgs {
            config,
            format,
            log_file,
            profile,
            query,
        }),
        Err(_) => Err("Expected exactly two arguments: <profile> <query>".to_string()),
    }
}

fn run(args: CliArgs) -> Result<(), String> {
    let config_path = args
        .config
        .or_else(default_config_path)
        .ok_or("No --config given and no default configuration directory")?;

    let client = open_client(&config_path, &args.profile, Arc::new(SqliteDriver::new())).map_err(|e| e.to_string())?;

    let tabular = args.format != OutputFormat::Rows;
    let result = client.execute(&args.query, None, tabular);
    client.close();

    match result.map_err(|e| e.to_string())? {
        QueryOutput::Rows(Some(rows)) => {
            for row in rows {
                let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
                println!("{}", cells.join("\t"));
            }
        }
        QueryOutput::Rows(None) => println!("Statement executed, no rows returned."),
        QueryOutput::Table(table) => match args.format.export_name() {
            Some(name) => print!("{}", table.export(name).map_err(|e| e.to_string())?),
            None => print!("{}", table.render()),
        },
    }
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}\n{}", message, USAGE);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_logging(args.log_file.as_deref()) {
        eprintln!("Failed to open log file: {}", e);
        return ExitCode::FAILURE;
    }

    info!(profile = %args.profile, "Starting dbbridge");
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!(error = %message, "Error during database operations");
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}
