//! apiknock CLI - authorization matrix testing for OpenAPI described APIs

mod report;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indexmap::IndexMap;
use tracing_subscriber::EnvFilter;

use apiknock_core::{Credential, Identities, KnockConfig, Plan, RequestDescriptor, catalog};
use apiknock_runner::{AuthMode, HttpRequester, RunConfig, TestEngine, fire, loader};

#[derive(Parser)]
#[command(name = "apiknock")]
#[command(about = "Check API authorization with one synthesized request per operation and identity")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the authorization matrix against a live API
    Knock {
        #[command(flatten)]
        target: TargetArgs,

        /// Matrix config (default: .apiknock.json, .apiknock.toml, knockerconf.json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Show the execution plan without sending requests
        #[arg(long)]
        dry_run: bool,

        /// Also write the JSON report to this file
        #[arg(long)]
        output_file: Option<PathBuf>,
    },

    /// Send every operation once and print the status codes, without checks
    Fire {
        #[command(flatten)]
        target: TargetArgs,

        /// Matrix config, read for parameter_override only
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Generate a starting matrix config from an API description
    Init {
        /// OpenAPI 3 / Swagger 2 description (JSON or YAML)
        #[arg(short, long)]
        spec: PathBuf,

        /// Number of identities (2..=9)
        #[arg(short, long, default_value_t = 2)]
        user_count: u8,

        /// File to create (TOML if it ends in .toml)
        #[arg(short, long, default_value = "knockerconf.json")]
        file: PathBuf,
    },

    /// Export JSON Schema for the result report or the config file
    Schema {
        #[arg(long, default_value = "results")]
        kind: SchemaKind,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// OpenAPI 3 / Swagger 2 description (JSON or YAML)
    #[arg(short, long)]
    spec: PathBuf,

    /// Target base URL (default: taken from the API description)
    #[arg(short, long)]
    base_url: Option<String>,

    /// Credential for user_1, user_2, ... in order (repeatable)
    #[arg(short = 't', long = "token")]
    tokens: Vec<String>,

    /// How credentials are sent
    #[arg(long, default_value = "bearer")]
    auth_type: AuthType,

    /// Header, cookie or query parameter name for the credential
    #[arg(long)]
    auth_name: Option<String>,

    /// Skip TLS certificate verification
    #[arg(short = 'k', long)]
    insecure: bool,

    /// Proxy for http and https traffic
    #[arg(long)]
    proxy: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum AuthType {
    Bearer,
    Header,
    Cookie,
    Query,
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum SchemaKind {
    Results,
    Config,
}

impl TargetArgs {
    fn auth_mode(&self) -> AuthMode {
        let name = |default: &str| self.auth_name.clone().unwrap_or_else(|| default.to_string());
        match self.auth_type {
            AuthType::Bearer => AuthMode::Bearer,
            AuthType::Header => AuthMode::Header(name("Authorization")),
            AuthType::Cookie => AuthMode::Cookie(name("session")),
            AuthType::Query => AuthMode::Query(name("access_token")),
        }
    }

    fn requester(&self) -> Result<HttpRequester> {
        Ok(HttpRequester::builder()
            .with_verify_certs(!self.insecure)
            .with_proxy(self.proxy.clone())
            .with_timeout(Duration::from_secs(self.timeout))
            .build()?)
    }

    /// Catalog of the API description plus the base URL to send it to, if known.
    fn catalog(&self) -> Result<(Vec<RequestDescriptor>, Option<String>)> {
        let spec = loader::load(&self.spec)?;
        let catalog = catalog::build(&spec)?;
        Ok((catalog, self.base_url.clone().or(spec.base_url)))
    }
}

fn require_base_url(base_url: Option<String>) -> Result<String> {
    base_url.context("no base URL: pass --base-url or declare one in the API description")
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log_level, cli.log_file.as_deref()) {
        eprintln!("Error: {e:#}");
        return ExitCode::from(3);
    }

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(3)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(3)
        }
    }
}

fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let _ = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<KnockConfig> {
    let config = match path {
        Some(path) => KnockConfig::load(path)?,
        None => KnockConfig::load_default()?,
    };
    Ok(config)
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Knock {
            target,
            config,
            dry_run,
            output_file,
        } => {
            let cfg = load_config(config.as_deref())?;
            let (catalog, base_url) = target.catalog()?;
            let identities = Identities::from_tokens(target.tokens.iter().cloned());

            if dry_run {
                let plan = Plan::build(&catalog, &cfg, &identities);
                match cli.output {
                    OutputFormat::Terminal => println!("{}", plan.to_terminal()),
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
                    OutputFormat::Silent => {}
                }
                return Ok(if plan.has_errors() { 2 } else { 0 });
            }

            cfg.validate()?;
            let base_url = require_base_url(base_url)?;
            if identities.len() < usize::from(cfg.user_count) {
                tracing::warn!(
                    supplied = identities.len(),
                    user_count = cfg.user_count,
                    "fewer credentials than user_count"
                );
            }

            let auth = target.auth_mode();
            if cli.output == OutputFormat::Terminal {
                eprintln!("Target:     {base_url}");
                eprintln!("Operations: {}", catalog.len());
                eprintln!("Identities: {} ({auth})", identities.len());
                eprintln!();
            }

            let mut requester = target.requester()?;
            let engine = TestEngine::new(RunConfig::from_config(&cfg, identities, auth, base_url));
            let results = engine.run(&catalog, &mut requester)?;
            let verdict = results.verdict();

            let json = report::to_json(&results, &verdict);
            match cli.output {
                OutputFormat::Terminal => println!("{}", report::to_terminal(&results, &verdict)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json)?),
                OutputFormat::Silent => {}
            }
            if let Some(path) = output_file {
                std::fs::write(&path, serde_json::to_string_pretty(&json)?)
                    .with_context(|| format!("cannot write {}", path.display()))?;
                tracing::info!(path = %path.display(), "report written");
            }

            Ok(verdict.exit_code)
        }

        Commands::Fire { target, config } => {
            let overrides = match config {
                Some(path) => KnockConfig::load(&path)?.parameter_override,
                None => IndexMap::new(),
            };
            let (catalog, base_url) = target.catalog()?;
            let base_url = require_base_url(base_url)?;
            let auth = target.auth_mode();
            let credential = target.tokens.first().map(|t| Credential::new(t.clone()));
            let mut requester = target.requester()?;

            let report = fire(
                &catalog,
                &base_url,
                &overrides,
                credential.as_ref().map(|c| (&auth, c)),
                &mut requester,
            )?;
            match cli.output {
                OutputFormat::Terminal => println!("{}", report::fire_to_terminal(&report)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Silent => {}
            }
            Ok(0)
        }

        Commands::Init {
            spec,
            user_count,
            file,
        } => {
            let resolved = loader::load(&spec)?;
            let catalog = catalog::build(&resolved)?;
            let config = KnockConfig::scaffold(&catalog, user_count)?;
            config.write(&file)?;

            if cli.output != OutputFormat::Silent {
                println!("Created {} ({} operations)", file.display(), catalog.len());
                println!("\nEdit the file to configure:");
                println!("  - matrix: which user_N may call each operation");
                println!("  - success / blocked: [\"http_code\", 200] or [\"http_body\", \"regex\"]");
                println!("  - parameter_override: fixed values for IDs owned by user_1");
            }
            Ok(0)
        }

        Commands::Schema { kind } => {
            let schema = match kind {
                SchemaKind::Results => apiknock_core::outcome::generate_schema()?,
                SchemaKind::Config => apiknock_core::matrix::generate_config_schema()?,
            };
            println!("{schema}");
            Ok(0)
        }
    }
}
