//! refmirror - mirror every reference of a git repository to another
//!
//! Usage:
//!   refmirror --src <url> --dst <url>
//!   refmirror --config mirror.toml
//!   REFMIRROR_SSH_PRIVATE_KEY="$(cat id_ed25519)" refmirror --src ... --dst git@host:repo.git

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refmirror_core::{MirrorConfig, MirrorSummary, PrunePolicy, Transfer};

#[derive(Parser)]
#[command(name = "refmirror")]
#[command(about = "Mirror all references of a git repository to another", long_about = None)]
struct Cli {
    /// TOML configuration file; flags override its values
    #[arg(long, short, env = "REFMIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Source repository URL
    #[arg(long, env = "REFMIRROR_SRC_REPO")]
    src: Option<String>,

    /// Destination repository URL
    #[arg(long, env = "REFMIRROR_DST_REPO")]
    dst: Option<String>,

    /// known_hosts content trusted for SSH destinations
    #[arg(long, env = "REFMIRROR_SSH_KNOWN_HOSTS", hide_env_values = true)]
    ssh_known_hosts: Option<String>,

    /// known_hosts file used when no content is given (default ~/.ssh/known_hosts)
    #[arg(long, env = "REFMIRROR_SSH_KNOWN_HOSTS_PATH")]
    ssh_known_hosts_path: Option<PathBuf>,

    /// SSH private key content; prefer the environment variable
    #[arg(long, env = "REFMIRROR_SSH_PRIVATE_KEY", hide_env_values = true)]
    ssh_private_key: Option<String>,

    /// Read the SSH private key from a file
    #[arg(long, env = "REFMIRROR_SSH_PRIVATE_KEY_FILE", conflicts_with = "ssh_private_key")]
    ssh_private_key_file: Option<PathBuf>,

    /// Passphrase of the SSH private key
    #[arg(long, env = "REFMIRROR_SSH_PASSPHRASE", hide_env_values = true)]
    ssh_passphrase: Option<String>,

    /// SSH user when the URL does not name one
    #[arg(long, env = "REFMIRROR_SSH_USERNAME")]
    ssh_username: Option<String>,

    /// Reference prefix to leave out of the mirror (repeatable, default refs/pull)
    #[arg(long = "exclude-prefix", env = "REFMIRROR_EXCLUDE_PREFIXES", value_delimiter = ',')]
    exclude_prefixes: Vec<String>,

    /// Mirror every reference, including the default exclusions
    #[arg(long, env = "REFMIRROR_NO_EXCLUDE", conflicts_with = "exclude_prefixes")]
    no_exclude: bool,

    /// How to treat destination references missing from the source
    #[arg(long, env = "REFMIRROR_PRUNE")]
    prune: Option<PruneArg>,

    /// Directory for the staging repository and temporary files
    #[arg(long, env = "REFMIRROR_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, env = "REFMIRROR_DEBUG")]
    debug: bool,

    /// Output format
    #[arg(short, long, env = "REFMIRROR_FORMAT", default_value = "table")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum PruneArg {
    /// Prune; a failed prune only warns
    BestEffort,
    /// Prune; a failed prune fails the run
    Strict,
    /// Do not prune
    Off,
}

impl From<PruneArg> for PrunePolicy {
    fn from(arg: PruneArg) -> Self {
        match arg {
            PruneArg::BestEffort => PrunePolicy::BestEffort,
            PruneArg::Strict => PrunePolicy::Strict,
            PruneArg::Off => PrunePolicy::Off,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable summary
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// No output on success
    Quiet,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format;
    let config = build_config(cli)?;

    let default_filter = if config.debug {
        "refmirror=debug,refmirror_core=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!(?config, "Resolved configuration");

    let summary = refmirror_core::mirror(config).context("Mirror failed")?;
    print_summary(&summary, format)?;
    Ok(())
}

/// Merge the optional config file with flags and environment.
fn build_config(cli: Cli) -> Result<MirrorConfig> {
    let mut config = match &cli.config {
        Some(path) => MirrorConfig::from_file(path)?,
        None => MirrorConfig::default(),
    };

    if let Some(src) = cli.src {
        config.src_repo = src;
    }
    if let Some(dst) = cli.dst {
        config.dst_repo = dst;
    }
    if let Some(known_hosts) = cli.ssh_known_hosts {
        config.ssh.known_hosts = known_hosts;
    }
    if let Some(path) = cli.ssh_known_hosts_path {
        config.ssh.known_hosts_path = Some(path);
    }
    if let Some(key) = cli.ssh_private_key {
        config.ssh.private_key = key.into();
    }
    if let Some(path) = cli.ssh_private_key_file {
        let key = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read SSH private key: {}", path.display()))?;
        config.ssh.private_key = key.into();
    }
    if let Some(passphrase) = cli.ssh_passphrase {
        config.ssh.passphrase = Some(passphrase.into());
    }
    if let Some(username) = cli.ssh_username {
        config.ssh.username = Some(username);
    }
    if cli.no_exclude {
        config.exclude_prefixes.clear();
    } else if !cli.exclude_prefixes.is_empty() {
        config.exclude_prefixes = cli.exclude_prefixes;
    }
    if let Some(prune) = cli.prune {
        config.prune = prune.into();
    }
    if let Some(dir) = cli.temp_dir {
        config.temp_dir = Some(dir);
    }
    config.debug |= cli.debug;

    config.validate()?;
    Ok(config)
}

fn print_summary(summary: &MirrorSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("Fetched:  {}", describe(summary.fetched));
            println!("Excluded: {} reference(s)", summary.excluded.len());
            println!("Pushed:   {}", describe(summary.pushed));
            println!("Pruned:   {} reference(s)", summary.pruned.len());
            for name in &summary.pruned {
                println!("  - {name}");
            }
            if let Some(err) = &summary.prune_error {
                println!("Warning: prune failed: {err}");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
        OutputFormat::Quiet => {}
    }
    Ok(())
}

fn describe(transfer: Transfer) -> String {
    match transfer {
        Transfer::Updated(count) => format!("{count} reference(s) updated"),
        Transfer::UpToDate => "already up to date".to_string(),
    }
}
