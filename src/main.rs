use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use log::debug;

use megaset::{DatasetLoader, LoadMode, LoadRequest, LoaderConfig, open_source};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// What the invocation should print.
#[derive(Debug, PartialEq)]
enum Command {
    Load,
    Schema,
    Neighborhoods,
    Values(String),
    Document(String),
    Summary,
}

#[derive(Debug)]
struct Args {
    path: PathBuf,
    command: Command,
    mode: LoadMode,
    neighborhoods: Vec<String>,
    columns: Option<Vec<String>>,
    config: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let raw: Vec<String> = env::args().skip(1).collect();
    if raw.iter().any(|a| a == "--help" || a == "-h") || raw.is_empty() {
        print_help();
        return Ok(());
    }
    if raw.iter().any(|a| a == "--version" || a == "-V") {
        println!("megaset v{VERSION}");
        return Ok(());
    }

    let args = parse_args(raw)?;
    debug!("{args:?}");

    let config = match &args.config {
        Some(path) => LoaderConfig::from_file(path)?,
        None => LoaderConfig::default(),
    }
    .apply_env()?;

    let source = open_source(&args.path)?;
    let loader = DatasetLoader::new(source, &config);

    match args.command {
        Command::Load => {
            let mut request = LoadRequest::new(args.mode, &args.neighborhoods);
            if let Some(columns) = args.columns {
                request = request.with_columns(columns);
            }
            let table = loader.load(&request)?;
            println!("{table}");
            println!("{} rows x {} columns", table.num_rows(), table.num_columns());
        }
        Command::Schema => {
            for field in loader.schema()?.fields() {
                println!("{}\t{}", field.name(), field.data_type());
            }
        }
        Command::Neighborhoods => {
            for name in loader.neighborhoods()? {
                println!("{name}");
            }
        }
        Command::Values(column) => {
            for value in loader.column_values(&column, &args.neighborhoods)? {
                println!("{value}");
            }
        }
        Command::Document(document) => {
            let table = loader.properties_for_document(&document)?;
            println!("{table}");
            println!("{} properties owned by {document}", table.num_rows());
        }
        Command::Summary => {
            let summary = loader.summary()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("serializing summary")?
            );
        }
    }

    Ok(())
}

fn parse_args(raw: Vec<String>) -> Result<Args> {
    let mut path = None;
    let mut command = Command::Load;
    let mut mode = LoadMode::Essential;
    let mut neighborhoods = Vec::new();
    let mut columns = None;
    let mut config = None;

    let mut it = raw.into_iter();
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| it.next().with_context(|| format!("{flag} needs a value"));
        match arg.as_str() {
            "--mode" | "-m" => mode = value("--mode")?.parse()?,
            "--neighborhood" | "-n" => neighborhoods.push(value("--neighborhood")?),
            "--columns" | "-c" => {
                columns = Some(
                    value("--columns")?
                        .split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect(),
                )
            }
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "--schema" => command = Command::Schema,
            "--neighborhoods" => command = Command::Neighborhoods,
            "--values" => command = Command::Values(value("--values")?),
            "--document" | "-d" => command = Command::Document(value("--document")?),
            "--summary" => command = Command::Summary,
            flag if flag.starts_with('-') => bail!("unknown option {flag}"),
            file => {
                if path.replace(PathBuf::from(file)).is_some() {
                    bail!("only one dataset file may be given");
                }
            }
        }
    }

    // a neighborhood without an explicit mode means "filter by it"
    if !neighborhoods.is_empty() && mode == LoadMode::Essential && command == Command::Load {
        mode = LoadMode::Neighborhood;
    }

    Ok(Args {
        path: path.context("missing dataset file (.parquet or .csv)")?,
        command,
        mode,
        neighborhoods,
        columns,
        config,
    })
}

fn print_help() {
    println!(
        r#"megaset v{VERSION} - property dataset loader

Usage:
  megaset <file> [--mode essential|neighborhood|full] [-n BAIRRO]... [-c COL,COL]
  megaset <file> --schema
  megaset <file> --neighborhoods
  megaset <file> --values COLUMN [-n BAIRRO]...
  megaset <file> --document CPF
  megaset <file> --summary

Options:
  --config FILE   JSON loader config (execution_context, cache_ttl_secs, ...)

Environment:
  MEGASET_EXECUTION_CONTEXT=relaxed   allow full loads
  DEPLOYMENT_MODE=production          force the memory-constrained context
  RUST_LOG=debug                      loader logging"#
    );
}
