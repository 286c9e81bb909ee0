//! dirquery Command-Line Client
//!
//! Runs one directory query and prints the result.

mod commands;
mod config;
mod executor;
mod formatter;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use dirquery_client::{
    ConnectionPool, Credentials, ExecutionContext, LdapConnectionFactory, PoolConfig,
};
use dirquery_proto::SearchScope;

use commands::{CliTranslator, Command};
use config::CliConfig;
use executor::Session;
use formatter::OutputFormat;

/// Search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    Base,
    One,
    Sub,
}

impl From<ScopeArg> for SearchScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Base => SearchScope::Base,
            ScopeArg::One => SearchScope::OneLevel,
            ScopeArg::Sub => SearchScope::Subtree,
        }
    }
}

/// dirquery Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "dirquery")]
#[command(version, about = "Query an LDAP directory with paging, VLV and range retrieval")]
pub struct Args {
    /// Server address, e.g. ldap://dc01:389 or dc01:636
    #[arg(short = 'H', long)]
    pub server: Option<String>,

    /// Bind DN for a simple bind
    #[arg(short = 'D', long)]
    pub bind_dn: Option<String>,

    /// Bind password
    #[arg(short = 'w', long, requires = "bind_dn")]
    pub password: Option<String>,

    /// Search base
    #[arg(short = 'b', long)]
    pub base: Option<String>,

    /// Search scope
    #[arg(short = 's', long, default_value = "sub", value_enum)]
    pub scope: ScopeArg,

    /// Largest page the server returns
    #[arg(long)]
    pub max_page_size: Option<u32>,

    /// Never drive a paged search
    #[arg(long)]
    pub no_paging: bool,

    /// Upgrade the connection with StartTLS
    #[arg(long)]
    pub starttls: bool,

    /// Transport timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// JSON settings file (connection, pool, base)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Settings file overlaid with command-line flags.
    fn settings(&self) -> Result<CliConfig, executor::ExecuteError> {
        let mut settings = match &self.config {
            Some(path) => CliConfig::load(path)?,
            None => CliConfig::default(),
        };

        if let Some(server) = &self.server {
            settings.connection.server = server.clone();
        }
        if let Some(bind_dn) = &self.bind_dn {
            let password = self.password.clone().unwrap_or_default();
            settings.connection.credentials = Some(Credentials::new(bind_dn.clone(), password));
        }
        if let Some(timeout) = self.timeout {
            settings.connection = settings.connection.with_timeout(Duration::from_secs(timeout));
        }
        if self.starttls {
            settings.connection = settings.connection.with_starttls(true);
        }
        if let Some(base) = &self.base {
            settings.base = Some(base.clone());
        }
        if let Some(max_page_size) = self.max_page_size {
            settings.max_page_size = Some(max_page_size);
        }
        // A single command needs one connection at most.
        if self.config.is_none() {
            settings.pool = PoolConfig::new(0, 1);
        }
        Ok(settings)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dirquery_cli=info,dirquery_client=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = args.settings()?;

    // Connection drivers live on this runtime; queries block the main thread.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("dirquery-io")
        .build()?;

    let factory = LdapConnectionFactory::new(settings.connection.clone(), runtime.handle().clone())?;
    tracing::debug!(address = %factory.address(), "Using directory server");
    let pool = ConnectionPool::new(factory, settings.pool.clone())?;

    let mut context = ExecutionContext::default()
        .with_scope(args.scope.into())
        .with_paging(!args.no_paging);
    if let Some(max_page_size) = settings.max_page_size {
        context = context.with_max_page_size(max_page_size);
    }

    let translator = CliTranslator::new(settings.base.clone().unwrap_or_default());
    let session = Session::new(pool, translator, context);
    let formatter = formatter::create_formatter(args.format);

    let result = session.execute(&args.command, &*formatter);
    session.close();
    runtime.shutdown_timeout(Duration::from_secs(1));

    println!("{}", result?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "dirquery",
            "-H",
            "dc01:636",
            "-D",
            "CN=svc,DC=test",
            "-w",
            "secret",
            "-b",
            "DC=test",
            "--timeout",
            "5",
            "count",
            "(objectClass=user)",
        ]);
        let settings = args.settings().unwrap();

        assert_eq!(settings.connection.server, "dc01:636");
        assert_eq!(settings.connection.timeout_ms, 5000);
        assert_eq!(
            settings.connection.credentials.map(|c| c.bind_dn),
            Some("CN=svc,DC=test".to_string())
        );
        assert_eq!(settings.base.as_deref(), Some("DC=test"));
        assert_eq!(settings.pool.max_pool_size, 1);
        assert!(matches!(args.command, Command::Count { .. }));
    }

    #[test]
    fn test_scope_mapping() {
        assert_eq!(SearchScope::from(ScopeArg::One), SearchScope::OneLevel);
        assert_eq!(SearchScope::from(ScopeArg::Base), SearchScope::Base);
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
