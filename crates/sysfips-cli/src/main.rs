//! sysfips command-line interface: report system FIPS mode and crypto-policy
//! alignment.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use schemars::schema_for;
use serde::Serialize;
use serde_json::to_string_pretty;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use sysfips_core::{
    config::DEFAULT_CONFIG_PATH, logging, policy, CapabilityKind, DiagnosticSink, FipsResolver,
    LogSink, ProbeConfig,
};
use sysfips_nss::open_resolver;

/// Top-level command-line options shared by every subcommand.
#[derive(Parser, Debug)]
#[command(
    name = "sysfips",
    version,
    about = "Report whether the system crypto subsystem runs in FIPS mode."
)]
struct Cli {
    /// Path to the sysfips configuration file. Defaults apply when missing.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print resolver diagnostics (through the logger at debug level).
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Query FIPS mode once and print the result.
    Status {
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Exit 0 when FIPS mode is enabled, 1 when disabled, 2 when unknown.
    Check,

    /// Compare kernel FIPS status with the system crypto policy.
    Policy {
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration file or emit the config schema.
    Validate {
        /// Path to the configuration file to validate.
        #[arg(short = 'f', long, default_value = DEFAULT_CONFIG_PATH)]
        file: PathBuf,

        /// Output the JSON schema instead of validating a file.
        #[arg(long)]
        schema: bool,
    },
}

const EXIT_DISABLED: u8 = 1;
const EXIT_UNKNOWN: u8 = 2;

#[derive(Serialize)]
struct StatusOutput {
    fips_enabled: bool,
    source: Option<CapabilityKind>,
}

/// Entry point: parse arguments and surface errors with an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_UNKNOWN)
        }
    }
}

/// Dispatch to the requested subcommand.
fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    if let Commands::Validate { file, schema } = &cli.command {
        logging::init("warn", false);
        return validate(file, *schema);
    }

    let config = load_config(&cli.config)?;
    let debug = cli.debug || config.diagnostics.enabled;
    logging::init(if debug { "debug" } else { "warn" }, debug);
    let session = Session::open(&config, debug)?;

    match cli.command {
        Commands::Status { json } => {
            let fips_enabled = session
                .resolver
                .query()
                .context("fips status unknown")?;
            let output = StatusOutput {
                fips_enabled,
                source: session.resolver.capability(),
            };
            if json {
                println!("{}", to_string_pretty(&output)?);
            } else {
                println!(
                    "FIPS mode: {} (source: {})",
                    if fips_enabled { "enabled" } else { "disabled" },
                    source_label(output.source)
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check => {
            let code = match session.resolver.query() {
                Ok(true) => ExitCode::SUCCESS,
                Ok(false) => ExitCode::from(EXIT_DISABLED),
                Err(err) => {
                    log::warn!("[{}] {err}", err.code());
                    ExitCode::from(EXIT_UNKNOWN)
                }
            };
            Ok(code)
        }
        Commands::Policy { json } => {
            let report = policy::evaluate(
                &session.resolver,
                &config.policy,
                session.resolver.diagnostics(),
            )?;
            if json {
                println!("{}", to_string_pretty(&report)?);
            } else {
                println!(
                    "Kernel FIPS mode: {} (source: {})",
                    if report.fips_enabled { "enabled" } else { "disabled" },
                    source_label(report.source)
                );
                match &report.policy {
                    Some(policy) => println!("Crypto policy: {}", policy.name),
                    None => println!("Crypto policy: <not configured>"),
                }
                println!(
                    "System FIPS alignment: {}",
                    if report.aligned { "enabled" } else { "disabled" }
                );
                if !report.consistent {
                    println!("Warning: kernel FIPS mode and crypto policy disagree.");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate { file, schema } => validate(&file, schema),
    }
}

/// Check a configuration file, or print the config JSON schema.
fn validate(file: &Path, schema: bool) -> Result<ExitCode> {
    if schema {
        let schema = schema_for!(ProbeConfig);
        println!("{}", to_string_pretty(&schema)?);
        return Ok(ExitCode::SUCCESS);
    }

    let cfg = ProbeConfig::parse(file)
        .with_context(|| format!("failed to load configuration from {}", file.display()))?;

    let issues = cfg.validate();
    if issues.is_empty() {
        println!(
            "Configuration valid (library {}, status file {}).",
            cfg.native.library, cfg.status.path
        );
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("Configuration validation failed:");
        for issue in issues {
            eprintln!("  - {issue}");
        }
        Ok(ExitCode::FAILURE)
    }
}

/// Resolver plus the diagnostic sink it borrows weakly; the sink must stay
/// alive for as long as the resolver is used.
struct Session {
    resolver: FipsResolver,
    _sink: Option<Arc<dyn DiagnosticSink>>,
}

impl Session {
    fn open(config: &ProbeConfig, debug: bool) -> Result<Self> {
        let sink: Option<Arc<dyn DiagnosticSink>> = if debug || config.diagnostics.enabled {
            Some(Arc::new(LogSink))
        } else {
            None
        };
        let resolver = open_resolver(config, sink.as_ref().map(Arc::downgrade))
            .context("failed to initialize fips resolver")?;
        Ok(Self {
            resolver,
            _sink: sink,
        })
    }
}

fn load_config(path: &Path) -> Result<ProbeConfig> {
    ProbeConfig::load_or_default(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn source_label(source: Option<CapabilityKind>) -> String {
    source
        .map(|kind| kind.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
