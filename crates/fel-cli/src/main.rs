//! `fel` command line tool
//!
//! Evaluates, parses or compiles a single expression and prints the result.

use anyhow::{Context as _, bail};
use clap::{Args, Parser, Subcommand};
use fel_core::{ConstantFolding, Context, EngineConfig, FelEngine, MapContext, NumericMode};
use fel_types::Value;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// FEL expression tool
#[derive(Parser)]
#[command(name = "fel")]
#[command(about = "Evaluate, parse and compile FEL expressions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate an expression and print the result as JSON
    Eval {
        expression: String,

        /// Variable binding as name=json, e.g. --var x=41 --var 'tags=["a"]'
        #[arg(long = "var", value_name = "NAME=JSON")]
        vars: Vec<String>,

        /// Execute through the compiler instead of the interpreter
        #[arg(long)]
        compile: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Print the node tree of an expression
    Parse {
        expression: String,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Print the emitted source and value table of an expression
    Compile {
        expression: String,

        /// Fold stable calls into constants first
        #[arg(long)]
        fold: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// Use arbitrary precision operators
    #[arg(long)]
    big: bool,

    /// Fractional digits kept by big-number division
    #[arg(long)]
    precision: Option<u32>,

    /// Engine configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl EngineArgs {
    fn build(&self) -> anyhow::Result<FelEngine> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        config.apply_env_overrides()?;
        if self.big {
            config.numeric = NumericMode::Big;
        }
        if let Some(precision) = self.precision {
            config.decimal_precision = precision;
        }
        debug!(?config, "Resolved engine configuration");
        Ok(FelEngine::with_config(config)?)
    }
}

fn parse_var(raw: &str) -> anyhow::Result<(String, Value)> {
    let Some((name, json)) = raw.split_once('=') else {
        bail!("expected NAME=JSON, got `{raw}`");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("variable name is empty in `{raw}`");
    }
    // Bare words that are not JSON are taken as strings
    let value = serde_json::from_str::<serde_json::Value>(json)
        .unwrap_or_else(|_| serde_json::Value::String(json.to_string()));
    Ok((name.to_string(), Value::from(value)))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    match cli.command {
        Command::Eval { expression, vars, compile, engine } => {
            let engine = engine.build()?;
            let mut ctx = MapContext::new();
            for raw in &vars {
                let (name, value) = parse_var(raw)?;
                ctx.set(&name, value);
            }

            let value = if compile {
                let compiled = engine.compile(&expression, Some(&ctx), &[])?;
                compiled.eval(&ctx)?
            } else {
                engine.eval_in(&expression, &ctx)?
            };
            info!(expression = %expression, result = %value, "Evaluated");
            let json = serde_json::Value::from(&value);
            println!("{}", serde_json::to_string_pretty(&json).context("rendering result")?);
        }
        Command::Parse { expression, engine } => {
            let node = engine.build()?.parse(&expression)?;
            print!("{node}");
        }
        Command::Compile { expression, fold, engine } => {
            let engine = engine.build()?;
            let folding = ConstantFolding::with_calls();
            let compiled = if fold {
                engine.compile(&expression, None, &[&folding])?
            } else {
                engine.compile(&expression, None, &[])?
            };
            println!("{}", compiled.source());
            for (i, slot) in compiled.slots().iter().enumerate() {
                println!("  ${i} = {slot}");
            }
        }
    }

    Ok(())
}
