use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pdbstall::{
    cli::Args,
    k8s::{client, source::KubeSource},
    logging,
    report::Reporter,
    run,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Some(shell) = args.completions {
        clap_complete::generate(shell, &mut Args::command(), "pdbstall", &mut std::io::stdout());
        return;
    }
    if args.mangen {
        let man = clap_mangen::Man::new(Args::command());
        if let Err(e) = man.render(&mut std::io::stdout()) {
            eprintln!("[pdbstall] failed to render man page: {e}");
            std::process::exit(1);
        }
        return;
    }

    logging::init(args.log_format, args.verbose);

    if let Err(e) = execute(args).await {
        error!(error = %format!("{e:#}"), "pdbstall failed");
        std::process::exit(1);
    }
}

async fn execute(args: Args) -> Result<()> {
    let path = client::kubeconfig_path(args.kubeconfig.as_deref())
        .context("resolving kubeconfig location")?;
    debug!(kubeconfig = %path.display(), "using kubeconfig");

    let kube_client = client::build_client(&path, args.context.as_deref())
        .await
        .context("building cluster client")?;
    info!(
        context = %client::effective_context(&path, args.context.as_deref()),
        "using cluster context"
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let source = KubeSource::new(kube_client);
    let mut reporter = Reporter::new(std::io::stdout(), args.output);
    run::diagnose(&source, &args.run_options(), &mut reporter, &cancel)
        .await
        .context("checking pod disruption budgets")?;
    let written = reporter.finish().context("flushing report output")?;
    debug!(reports = written, "output flushed");

    Ok(())
}
