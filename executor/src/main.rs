use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use executor::{
    init::{
        self,
        config::{self, GlobalConfig},
    },
    policy::Filter,
    sandbox::LimitOverrideBuilder,
    Coordinator, Error, Submission,
};

#[derive(Debug, Parser)]
#[command(name = "executor", about = "Run untrusted source under a sandbox")]
enum Cli {
    /// Execute a file and print the result as JSON
    Run(Run),
    /// Only run the policy filter over a file
    Check(Check),
    /// Print the effective configuration
    Config(Config),
}

#[derive(Debug, Parser)]
struct Run {
    file: PathBuf,
    #[arg(long, default_value_t = 0)]
    submitter: i64,
    #[arg(long)]
    timeout_ms: Option<u64>,
    #[arg(long)]
    max_output: Option<u64>,
    #[arg(long)]
    max_memory: Option<u64>,
}

#[derive(Debug, Parser)]
struct Check {
    file: PathBuf,
}

#[derive(Debug, Parser)]
struct Config {
    /// also write it to the config path
    #[arg(long)]
    write: bool,
}

async fn run(v: Run) -> Result<ExitCode> {
    let config = init::new().await?;
    let coordinator = Coordinator::new(config.clone())?;

    let source = tokio::fs::read_to_string(&v.file)
        .await
        .with_context(|| format!("reading {:?}", v.file))?;

    let mut o = LimitOverrideBuilder::default();
    if let Some(x) = v.timeout_ms {
        o = o.wall_clock_timeout_ms(x);
    }
    if let Some(x) = v.max_output {
        o = o.max_output_bytes(x);
    }
    if let Some(x) = v.max_memory {
        o = o.max_memory_bytes(x);
    }
    let limits = coordinator.limits().apply(&o.build()?);

    match coordinator
        .execute(Submission::new(source, v.submitter), Some(limits))
        .await
    {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if err.is_system_fault() => {
            log::error!("{}", err);
            eprintln!("{}", err.user_message());
            Ok(ExitCode::from(1))
        }
        Err(err) => {
            let violations = match &err {
                Error::PolicyRejected(violations) => violations.clone(),
                _ => Vec::new(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "error": err.user_message(),
                    "policyViolations": violations,
                }))?
            );
            Ok(ExitCode::from(2))
        }
    }
}

async fn check(v: Check) -> Result<ExitCode> {
    let config = config::init().await?;
    init::logger::init(config.log_level);
    let filter = Filter::new(config.policy.rules.clone())?;

    let source = tokio::fs::read_to_string(&v.file)
        .await
        .with_context(|| format!("reading {:?}", v.file))?;
    println!("{}", serde_json::to_string_pretty(&filter.check(&source))?);
    Ok(ExitCode::SUCCESS)
}

async fn show_config(v: Config) -> Result<ExitCode> {
    let path = config::config_path();
    let config = GlobalConfig::load(&path).await?;
    print!("{}", toml::to_string(&config)?);
    if v.write {
        config.save(&path).await?;
        eprintln!("written to {:?}", path);
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli {
        Cli::Run(v) => run(v).await,
        Cli::Check(v) => check(v).await,
        Cli::Config(v) => show_config(v).await,
    }
}
