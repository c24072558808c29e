//! Gridcalc CLI - evaluate and inspect spreadsheet formulas

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gridcalc::prelude::*;
use gridcalc::{parse_formula, serialize_formula, tokenize};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gridcalc")]
#[command(author, version, about = "Spreadsheet formula evaluator")]
struct Cli {
    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a formula against a scratch workbook
    #[command(alias = "e")]
    Eval {
        /// Formula text, with or without the leading '='
        formula: String,

        /// Cell the formula is placed in
        #[arg(long, default_value = "A1")]
        at: String,

        /// Cell contents, e.g. A1=5, Data!B2=hello, C1==A1*2
        #[arg(short, long = "set", value_name = "CELL=VALUE")]
        values: Vec<String>,

        /// Workbook-scoped name, e.g. Rate=0.05 or Total==SUM(A1:A3)
        #[arg(short, long = "name", value_name = "NAME=EXPR")]
        names: Vec<String>,

        /// User function, e.g. "Hyp(a,b)=SQRT(a^2+b^2)"
        #[arg(short, long = "function", value_name = "NAME(PARAMS)=BODY")]
        functions: Vec<String>,

        /// Extra sheet added after Sheet1, in order
        #[arg(long = "sheet", value_name = "NAME")]
        sheets: Vec<String>,

        /// Print calculation statistics to stderr
        #[arg(long)]
        stats: bool,

        /// Maximum nesting of groups and calls in formula text
        #[arg(long, value_name = "N")]
        max_parse_depth: Option<usize>,

        /// Maximum expression tree height, counting operator chains
        #[arg(long, value_name = "N")]
        max_parse_height: Option<usize>,

        /// Maximum nesting of name and user function expansion
        #[arg(long, value_name = "N")]
        max_eval_depth: Option<usize>,
    },

    /// Print the tokens of a formula
    Tokens {
        /// Formula text
        formula: String,
    },

    /// Print a formula in canonical form
    Fmt {
        /// Formula text
        formula: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Eval {
            formula,
            at,
            values,
            names,
            functions,
            sheets,
            stats,
            max_parse_depth,
            max_parse_height,
            max_eval_depth,
        } => {
            let defaults = CalculationOptions::default();
            let input = EvalInput {
                formula,
                at,
                values,
                names,
                functions,
                sheets,
                options: CalculationOptions {
                    max_parse_depth: max_parse_depth.unwrap_or(defaults.max_parse_depth),
                    max_parse_height: max_parse_height.unwrap_or(defaults.max_parse_height),
                    max_eval_depth: max_eval_depth.unwrap_or(defaults.max_eval_depth),
                },
            };
            let mut engine = build_engine(&input)?;
            let value = evaluate(&mut engine, &input)?;
            println!("{}", value);

            if stats {
                let stats = engine.calculate();
                eprintln!(
                    "Calculated {} of {} formulas ({} errors, {} circular)",
                    stats.cells_calculated,
                    stats.formula_count,
                    stats.errors,
                    stats.circular_references
                );
            }
            Ok(())
        }
        Commands::Tokens { formula } => print_tokens(&formula),
        Commands::Fmt { formula } => {
            let expr = parse_formula(&formula)
                .with_context(|| format!("Failed to parse '{}'", formula))?;
            println!("{}", serialize_formula(&expr));
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct EvalInput {
    formula: String,
    at: String,
    values: Vec<String>,
    names: Vec<String>,
    functions: Vec<String>,
    sheets: Vec<String>,
    options: CalculationOptions,
}

fn build_engine(input: &EvalInput) -> Result<Engine> {
    let mut engine = Engine::new().with_options(input.options.clone());

    for sheet in &input.sheets {
        engine
            .add_sheet(sheet)
            .with_context(|| format!("Failed to add sheet '{}'", sheet))?;
    }

    for name in &input.names {
        let (name, expr) = split_assignment(name)?;
        engine
            .define_name(DefinedName::workbook_scope(name, expr))
            .with_context(|| format!("Failed to define name '{}'", name))?;
    }

    for function in &input.functions {
        let (head, body) = split_assignment(function)?;
        let (name, params) = parse_signature(head)?;
        engine
            .define_function(name, params, body)
            .with_context(|| format!("Failed to define function '{}'", name))?;
    }

    for assignment in &input.values {
        let (cell, content) = split_assignment(assignment)?;
        let cell = parse_cell(engine.workbook(), cell)?;
        if content.starts_with('=') {
            engine
                .set_formula(cell, content)
                .with_context(|| format!("Failed to set formula '{}'", content))?;
        } else {
            engine.set_value(cell, parse_value(content))?;
        }
    }

    Ok(engine)
}

fn evaluate(engine: &mut Engine, input: &EvalInput) -> Result<FormulaValue> {
    let target = parse_cell(engine.workbook(), &input.at)?;
    if engine.formula_text(target).is_some() {
        bail!("Cell '{}' already holds a formula from --set", input.at);
    }
    engine
        .set_formula(target, &input.formula)
        .with_context(|| format!("Failed to evaluate '{}'", input.formula))?;
    Ok(engine.get_value(target))
}

fn print_tokens(formula: &str) -> Result<()> {
    let tokens = tokenize(formula).with_context(|| format!("Failed to tokenize '{}'", formula))?;
    for token in tokens {
        println!(
            "{:>4}  {:<24} {}",
            token.position,
            format!("{:?}", token.kind),
            token.text
        );
    }
    Ok(())
}

/// Split `LEFT=RIGHT` at the first '='
fn split_assignment(text: &str) -> Result<(&str, &str)> {
    match text.split_once('=') {
        Some((left, right)) if !left.trim().is_empty() => Ok((left.trim(), right.trim())),
        _ => bail!("Expected LEFT=RIGHT, got '{}'", text),
    }
}

/// Parse `Name(a, b)` into a name and parameter list
fn parse_signature(head: &str) -> Result<(&str, Vec<String>)> {
    let Some((name, rest)) = head.split_once('(') else {
        return Ok((head, Vec::new()));
    };
    let Some(params) = rest.trim_end().strip_suffix(')') else {
        bail!("Unclosed parameter list in '{}'", head);
    };
    let params = params
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    Ok((name.trim(), params))
}

/// Parse `A1`, `Sheet2!B3` or `'My Sheet'!C4`
fn parse_cell(workbook: &Workbook, text: &str) -> Result<CellCoordinate> {
    let (sheet, address) = match text.rsplit_once('!') {
        Some((sheet, address)) => {
            let name = sheet
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .map(|s| s.replace("''", "'"))
                .unwrap_or_else(|| sheet.to_string());
            let index = workbook
                .sheet_index(&name)
                .with_context(|| format!("Unknown sheet '{}'", name))?;
            (index, address)
        }
        None => (0, text),
    };
    CellCoordinate::parse(address, sheet).with_context(|| format!("Invalid cell '{}'", text))
}

/// Interpret a constant the way a user would type it into a cell
fn parse_value(text: &str) -> CellValue {
    if let Ok(n) = text.parse::<f64>() {
        return CellValue::from(n);
    }
    if text.eq_ignore_ascii_case("TRUE") {
        return CellValue::from(true);
    }
    if text.eq_ignore_ascii_case("FALSE") {
        return CellValue::from(false);
    }
    if let Some(error) = CellError::parse(text) {
        return CellValue::from(error);
    }
    CellValue::from(text)
}
