use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use oci_audit::VerifyResult;
use oci_killswitch::EvaluationContext;
use std::fs;

/// Consulted directly by `verify-audit`, which loads no settings.
const LOG_LEVEL_ENV: &str = "ONCHAIN_LOG_LEVEL";

#[derive(Parser)]
#[command(name = "oci")]
#[command(about = "OnChain Intelligence kill switch CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a context JSON file offline and print the gated payload
    Evaluate {
        /// Path to an evaluation context (same body as POST /v1/onchain/context)
        path: String,

        /// Settings YAML paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Print the audit record instead of the payload
        #[arg(long, default_value_t = false)]
        audit: bool,
    },

    /// Load + validate settings and print hashes and canonical JSON
    ConfigCheck {
        /// Settings YAML paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Recompute the hashes of an audit record JSON file
    VerifyAudit {
        /// Path to an audit record
        path: String,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Evaluate {
            path,
            config_paths,
            audit,
        } => {
            let loaded = load(&config_paths)?;
            init_tracing(&loaded.settings.log_level);
            let policy = &loaded.settings.policy;

            let raw = fs::read_to_string(&path).with_context(|| format!("read {path}"))?;
            let ctx: EvaluationContext =
                serde_json::from_str(&raw).with_context(|| format!("parse context {path}"))?;
            if let Err(invalid) = oci_killswitch::validate_context(&ctx) {
                bail!("INVALID_CONTEXT field={}: {}", invalid.field, invalid.message);
            }

            let out = oci_killswitch::evaluate(&ctx, policy);
            if audit {
                let record = oci_audit::record_calculation(&ctx, &out, policy)?;
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
        }

        Commands::ConfigCheck { config_paths } => {
            let loaded = load(&config_paths)?;
            init_tracing(&loaded.settings.log_level);
            println!("policy_hash={}", loaded.policy_hash);
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::VerifyAudit { path } => {
            let log_level = std::env::var(LOG_LEVEL_ENV)
                .unwrap_or_else(|_| oci_config::DEFAULT_LOG_LEVEL.to_string());
            init_tracing(&log_level);
            let raw = fs::read_to_string(&path).with_context(|| format!("read {path}"))?;
            let record: oci_audit::AuditRecord =
                serde_json::from_str(&raw).with_context(|| format!("parse audit record {path}"))?;
            match oci_audit::verify_calculation_integrity(&record)? {
                VerifyResult::Valid => {
                    println!("verified=true calculation_hash={}", record.calculation_hash);
                }
                VerifyResult::Broken { reason } => {
                    bail!("AUDIT_INTEGRITY_BROKEN: {reason}");
                }
            }
        }
    }

    Ok(())
}

fn load(config_paths: &[String]) -> Result<oci_config::LoadedSettings> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    oci_config::load_settings(&path_refs)
}

/// `RUST_LOG` wins; otherwise the configured log level. Logs go to stderr so
/// stdout stays machine-readable.
fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .init();
}
