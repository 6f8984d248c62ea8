//! gridcalc CLI - evaluate cell scripts and standalone formulas

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gridcalc::prelude::*;
use gridcalc::{tokenize, DEFAULT_MAX_DEPTH};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gridcalc")]
#[command(author, version, about = "Spreadsheet formula engine")]
struct Cli {
    /// Log filter, e.g. `debug` or `gridcalc=trace` (default: $RUST_LOG, then `warn`)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Re-evaluate every dependent even when its precedents kept their values
    #[arg(long, global = true)]
    no_short_circuit: bool,

    /// Maximum formula nesting depth
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a script of cell edits and print every resulting value
    ///
    /// Each line is `ADDR INPUT`, e.g. `A1 10` or `A3 =A1+A2`. Blank lines
    /// and lines starting with `#` are ignored.
    Run {
        /// Script file
        script: PathBuf,

        /// Print JSON instead of tab-separated text
        #[arg(long)]
        json: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Evaluate a formula that references no cells
    Eval {
        /// Formula text, e.g. "=1+2*3"
        formula: String,
    },

    /// Print the token stream of a formula
    Tokens {
        /// Formula text
        formula: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let options = CalculationOptions {
        short_circuit: !cli.no_short_circuit,
        max_nesting_depth: cli.max_depth,
    };

    match cli.command {
        Commands::Run {
            script,
            json,
            output,
        } => {
            let sheet = run_script_file(&script, options)?;
            match output {
                Some(path) => {
                    let mut file = std::fs::File::create(&path)
                        .with_context(|| format!("Failed to create '{}'", path.display()))?;
                    write_values(&sheet, json, &mut file)?;
                }
                None => write_values(&sheet, json, &mut io::stdout().lock())?,
            }
            Ok(())
        }
        Commands::Eval { formula } => {
            let value = eval_formula(&formula, options)?;
            println!("{}", value);
            Ok(())
        }
        Commands::Tokens { formula } => print_tokens(&formula, &mut io::stdout().lock()),
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_script_file(path: &Path, options: CalculationOptions) -> Result<Sheet> {
    let script = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    run_script(&script, options)
}

/// Apply every edit in `script` to a fresh sheet
fn run_script(script: &str, options: CalculationOptions) -> Result<Sheet> {
    let mut sheet = Sheet::new().with_options(options);
    let mut edits = 0;

    for (index, line) in script.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (addr, input) = match line.split_once(char::is_whitespace) {
            Some((addr, input)) => (addr, input.trim()),
            None => (line, ""),
        };
        let addr = CellAddress::parse(addr)
            .with_context(|| format!("line {}: invalid cell address '{}'", line_no, addr))?;

        let report = sheet
            .set_formula(addr, input)
            .with_context(|| format!("line {}: cannot set {} to '{}'", line_no, addr, input))?;
        debug!(
            line = line_no,
            cell = %addr,
            changed = report.affected_cells.len(),
            "applied edit"
        );
        edits += 1;
    }

    info!(edits, cells = sheet.store().len(), "script applied");
    Ok(sheet)
}

#[derive(Serialize)]
struct CellOutput<'a> {
    cell: String,
    value: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    formula: Option<String>,
}

/// Write every populated cell in row-major order
fn write_values(sheet: &Sheet, json: bool, out: &mut impl Write) -> Result<()> {
    if json {
        let cells: Vec<CellOutput<'_>> = sheet
            .store()
            .iter()
            .map(|(addr, data)| CellOutput {
                cell: addr.to_string(),
                value: &data.value,
                formula: sheet.formula(addr),
            })
            .collect();
        serde_json::to_writer_pretty(&mut *out, &cells).context("Failed to write JSON")?;
        writeln!(out)?;
    } else {
        for (addr, data) in sheet.store().iter() {
            writeln!(out, "{}\t{}", addr, data.value)?;
        }
    }
    Ok(())
}

fn eval_formula(formula: &str, options: CalculationOptions) -> Result<Value> {
    let sheet = Sheet::new().with_options(options);
    sheet
        .evaluate_formula(formula)
        .with_context(|| format!("Failed to parse '{}'", formula))
}

fn print_tokens(formula: &str, out: &mut impl Write) -> Result<()> {
    let tokens = tokenize(formula).with_context(|| format!("Failed to tokenize '{}'", formula))?;
    for token in tokens {
        writeln!(out, "{}\t{}\t{}", token.position, token.kind, token.text)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn a(s: &str) -> CellAddress {
        CellAddress::parse(s).unwrap()
    }

    #[test]
    fn test_run_script_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "# inputs\nA1 2\nA2 3\n\nA3 =A1+A2\nB1 hello world\nA1 10"
        )
        .unwrap();

        let sheet = run_script_file(file.path(), CalculationOptions::default()).unwrap();
        assert_eq!(sheet.value(a("A3")), Value::Number(13.0));
        assert_eq!(sheet.value(a("B1")), Value::text("hello world"));

        let mut out = Vec::new();
        write_values(&sheet, false, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "A1\t10\nB1\thello world\nA2\t3\nA3\t13\n"
        );
    }

    #[test]
    fn test_run_script_reports_line_of_parse_error() {
        let err = run_script("A1 1\nA2 =A1+\n", CalculationOptions::default()).unwrap_err();
        assert!(format!("{:#}", err).starts_with("line 2:"), "{:#}", err);

        let err = run_script("1A 5\n", CalculationOptions::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("line 1: invalid cell address"));
    }

    #[test]
    fn test_run_script_clears_cell_without_input() {
        let sheet = run_script("A1 5\nB1 =A1*2\nA1\n", CalculationOptions::default()).unwrap();
        assert_eq!(sheet.value(a("A1")), Value::Empty);
        assert_eq!(sheet.value(a("B1")), Value::Number(0.0));
    }

    #[test]
    fn test_write_values_json() {
        let sheet = run_script("A1 2\nA2 =A1*A1\n", CalculationOptions::default()).unwrap();

        let mut out = Vec::new();
        write_values(&sheet, true, &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(json[0]["cell"], "A1");
        assert_eq!(json[0].get("formula"), None);
        assert_eq!(json[1]["cell"], "A2");
        assert_eq!(json[1]["formula"], "=A1*A1");
        assert_eq!(json[1]["value"]["Number"], 4.0);
    }

    #[test]
    fn test_write_values_to_file() {
        let sheet = run_script("C3 =1/0\n", CalculationOptions::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv");

        let mut file = std::fs::File::create(&path).unwrap();
        write_values(&sheet, false, &mut file).unwrap();
        drop(file);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "C3\t#DIV/0!\n");
    }

    #[test]
    fn test_eval_formula() {
        let options = CalculationOptions::default();
        assert_eq!(eval_formula("=2^3^2", options.clone()).unwrap(), Value::Number(512.0));
        assert_eq!(eval_formula("=A1", options.clone()).unwrap(), Value::Empty);

        let err = eval_formula("=1+", options).unwrap_err();
        assert!(format!("{:#}", err).starts_with("Failed to parse '=1+': Syntax error at position 3"));
    }

    #[test]
    fn test_print_tokens() {
        let mut out = Vec::new();
        print_tokens("=SUM(A1, 2)", &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "1\tfunction name\tSUM\n\
             4\t'('\t(\n\
             5\tcell reference\tA1\n\
             7\t','\t,\n\
             9\tnumber\t2\n\
             10\t')'\t)\n\
             11\tend of input\t\n"
        );
    }
}
