use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap_complete::Shell;

use crate::logging::LogFormat;
use crate::report::OutputFormat;
use crate::run::RunOptions;

#[derive(Parser, Debug)]
#[command(
    name = "pdbstall",
    about = "Report PodDisruptionBudgets that currently block every voluntary disruption",
    version
)]
pub struct Args {
    /// Path to kubeconfig file. Defaults to $KUBECONFIG or ~/.kube/config.
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Use a specific kubeconfig context instead of the current one.
    #[arg(long, value_name = "CONTEXT")]
    pub context: Option<String>,

    /// Restrict PDBs and pods to one namespace. Default: all namespaces.
    #[arg(short = 'n', long, value_name = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Seconds to wait for the initial pod list before giving up.
    #[arg(long, value_name = "SECONDS", default_value_t = 60)]
    pub sync_timeout: u64,

    /// Report format on stdout.
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Log record format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Log at debug level. RUST_LOG overrides this.
    #[arg(short, long)]
    pub verbose: bool,

    /// Print shell completions for SHELL to stdout and exit.
    /// Example: `pdbstall --completions bash >> ~/.bash_completion`
    #[arg(long, value_name = "SHELL", hide = true)]
    pub completions: Option<Shell>,

    /// Print the man page to stdout and exit.
    #[arg(long, hide = true)]
    pub mangen: bool,
}

impl Args {
    /// Options for the diagnostic pass. An empty namespace means all.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            namespace: self.namespace.clone().filter(|ns| !ns.is_empty()),
            sync_timeout: Duration::from_secs(self.sync_timeout),
        }
    }
}
