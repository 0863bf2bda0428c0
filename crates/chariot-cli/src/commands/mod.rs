use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chariot_config::{ChariotConfig, ConfigLoader, WarningSeverity};
use chariot_core::{ChariotError, Node, Program, Result};
use chariot_runtime::FunctionRegistry;

mod run;

/// Chariot: reactive plans and agents on an embedded scripting runtime
#[derive(Parser)]
#[command(name = "chariot", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to chariot.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a JSON program in a session seeded from the bootstrap runtime
    Run {
        /// Program file (JSON statement list)
        program: PathBuf,
        /// Keep agents running this many seconds after the program returns
        #[arg(long, default_value = "0")]
        hold_secs: u64,
    },
    /// Parse a program and report what it calls, without running it
    Check {
        /// Program file (JSON statement list)
        program: PathBuf,
    },
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version and build info
    Version,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(&config.logging.level)
        };

        if config.logging.format == "json" {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
                )
                .json()
                .with_target(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
                )
                .with_target(false)
                .init();
        }

        match self.command {
            Commands::Run { program, hold_secs } => run::cmd_run(config, &program, hold_secs).await,
            Commands::Check { program } => Self::cmd_check(&program),
            Commands::Config { json } => Self::cmd_config(config, config_loader.path(), json),
            Commands::Version => Self::cmd_version(),
        }
    }

    fn cmd_check(path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path)?;
        let program = Program::from_json(&raw)?;

        let registry = FunctionRegistry::with_builtins();
        let mut called = BTreeSet::new();
        collect_calls(&program.statements, &mut called);
        let unknown: Vec<&str> = called
            .iter()
            .map(String::as_str)
            .filter(|name| !registry.contains(name))
            .collect();

        println!("✅ {}: {} statement(s)", path.display(), program.len());
        println!("   Calls: {} distinct function(s)", called.len());
        if !unknown.is_empty() {
            println!("   Not built in (must be declared by the program or bootstrap):");
            for name in unknown {
                println!("     - {name}");
            }
        }
        Ok(())
    }

    fn cmd_config(config: ChariotConfig, path: &Path, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }

        println!("# {}", path.display());
        println!(
            "{}",
            toml::to_string_pretty(&config).map_err(|e| ChariotError::Config(e.to_string()))?
        );

        let warnings = config.validate().map_err(ChariotError::Config)?;
        let count = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Warning)
            .count();
        for w in &warnings {
            println!("{w}");
        }
        if count == 0 {
            println!("✅ Configuration OK");
        }
        Ok(())
    }

    fn cmd_version() -> Result<()> {
        println!("chariot {}", env!("CARGO_PKG_VERSION"));
        println!("   Builtins: {}", FunctionRegistry::with_builtins().len());
        println!("   Config:   {}", ConfigLoader::resolve_path(None).display());
        Ok(())
    }
}

/// Every function name called directly by `nodes`, including inside closures.
fn collect_calls(nodes: &[Node], out: &mut BTreeSet<String>) {
    for node in nodes {
        match node {
            Node::Call { name, args } => {
                out.insert(name.clone());
                collect_calls(args, out);
            }
            Node::CallValue { callee, args } => {
                collect_calls(std::slice::from_ref(callee.as_ref()), out);
                collect_calls(args, out);
            }
            Node::Func { body, .. } | Node::Block { body } => collect_calls(body, out),
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                collect_calls(std::slice::from_ref(cond.as_ref()), out);
                collect_calls(then, out);
                collect_calls(otherwise, out);
            }
            Node::While { cond, body } => {
                collect_calls(std::slice::from_ref(cond.as_ref()), out);
                collect_calls(body, out);
            }
            Node::Return { value: Some(value) } => {
                collect_calls(std::slice::from_ref(value.as_ref()), out)
            }
            Node::Literal { .. }
            | Node::Var { .. }
            | Node::Break
            | Node::Continue
            | Node::Return { value: None } => {}
        }
    }
}
