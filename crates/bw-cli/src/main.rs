mod pgsummary;
mod render;

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bw_core::{JobFilter, ReportOutcome, Subsystem};
use bw_runner::{doctor, Config, Mode, Runner};

#[derive(Parser)]
#[command(name = "backwatch", version, about = "Backup health across pgBackRest, Syncoid and Restic")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Clone, Debug, Default)]
struct ConfigArgs {
    /// Configuration file (default ~/.config/backwatch/backwatch.toml)
    #[arg(long)]
    config: Option<String>,

    /// Prometheus server URL
    #[arg(long, env = "PROMETHEUS_URL")]
    prometheus_url: Option<String>,

    /// Sent as X-Api-Key
    #[arg(long, env = "PROMETHEUS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Host to probe with --verify
    #[arg(long, env = "BACKWATCH_HOST")]
    host: Option<String>,

    /// Domain appended to a bare host name
    #[arg(long, env = "NIXOS_DOMAIN")]
    domain: Option<String>,
}

impl ConfigArgs {
    fn path(&self) -> PathBuf {
        self.config.as_deref().map(Config::expand_path).unwrap_or_else(Config::default_path)
    }

    /// File (or defaults) with flags and environment on top.
    fn load(&self) -> anyhow::Result<Config> {
        let mut cfg = Config::load_or_default(&self.path())?;
        if let Some(url) = &self.prometheus_url {
            cfg.metrics.url = url.clone();
        }
        if let Some(key) = &self.api_key {
            cfg.metrics.api_key = Some(key.clone());
        }
        if let Some(host) = &self.host {
            cfg.probe.host = host.clone();
        }
        if let Some(domain) = &self.domain {
            cfg.probe.domain = Some(domain.clone());
        }
        Ok(cfg)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show the health of every backup and replication job
    Status {
        /// Limit to a subsystem (pgbackrest, syncoid, restic); repeatable
        #[arg(long = "subsystem", value_parser = parse_subsystem)]
        subsystems: Vec<Subsystem>,

        /// Case-insensitive substring of the job name
        #[arg(long)]
        name: Option<String>,

        /// Case-insensitive substring of the target
        #[arg(long)]
        target: Option<String>,

        /// Probe the host over ssh instead of reading metrics
        #[arg(long)]
        verify: bool,

        /// Machine-readable output
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        cfg: ConfigArgs,
    },

    /// Check connectivity to the metrics store (and the host with --verify)
    Doctor {
        #[arg(long)]
        verify: bool,

        #[command(flatten)]
        cfg: ConfigArgs,
    },

    /// Write the default configuration file
    Init {
        #[arg(long)]
        config: Option<String>,
    },

    /// Summarize `pgbackrest info --output=json` read from stdin
    PgbackrestSummary {
        #[arg(long)]
        config: Option<String>,
    },
}

fn parse_subsystem(s: &str) -> Result<Subsystem, String> {
    Subsystem::parse(s).ok_or_else(|| format!("unknown subsystem {s:?} (expected pgbackrest, syncoid or restic)"))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Status { subsystems, name, target, verify, json, cfg } => {
            let config = cfg.load()?;
            let mode = if verify { Mode::Verify } else { Mode::Metrics };
            let runner = Runner::open(config, mode)?;
            let subsystems = if subsystems.is_empty() { Subsystem::ALL.to_vec() } else { subsystems };
            let res = runner.run(&subsystems).await;

            let filter = JobFilter { subsystems, name, target };
            let report = res.registry.report(&filter);

            if json {
                println!("{}", render::render_json(&res, &report).context("serialize report")?);
            } else {
                for fault in &report.faults {
                    eprintln!("warning: {fault}");
                }
                match render::empty_message(&res, &report) {
                    Some(msg) => eprintln!("{msg}"),
                    None => print!("{}", render::render_text(&res, &report)),
                }
            }
            Ok(match report.outcome {
                ReportOutcome::Jobs => ExitCode::SUCCESS,
                ReportOutcome::FilteredEmpty | ReportOutcome::NoIdentitiesDiscovered { .. } => ExitCode::from(1),
            })
        }
        Command::Doctor { verify, cfg } => {
            let config = cfg.load()?;
            match doctor(&config, verify).await {
                Ok(lines) => {
                    for line in lines {
                        println!("{line}");
                    }
                    println!("OK");
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("doctor failed: {e:#}");
                    Ok(ExitCode::from(1))
                }
            }
        }
        Command::Init { config } => {
            let args = ConfigArgs { config, ..Default::default() };
            let path = args.path();
            if path.exists() {
                return Err(anyhow!("{} already exists; not overwriting", path.display()));
            }
            Config::default().save_to(&path)?;
            println!("Wrote {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::PgbackrestSummary { config } => {
            let cfg = ConfigArgs { config, ..Default::default() }.load()?;
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input).context("read stdin")?;
            if input.trim().is_empty() {
                return Err(anyhow!("no data received on stdin"));
            }
            let stanzas = bw_acquire_ssh::pgbackrest::parse_info(&input).context("parse pgbackrest info")?;
            print!("{}", pgsummary::render(&stanzas, bw_runner::now_epoch_seconds(), &cfg.staleness_policy()));
            Ok(ExitCode::SUCCESS)
        }
    }
}
