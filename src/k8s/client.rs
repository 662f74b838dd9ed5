use std::path::{Path, PathBuf};

use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Client,
};

use crate::error::{Error, Result};

/// Resolve which kubeconfig file to load.
///
/// An explicit path wins, then the first entry of `$KUBECONFIG`, then
/// `~/.kube/config`.
pub fn kubeconfig_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    if let Some(p) = std::env::var_os("KUBECONFIG")
        .as_deref()
        .and_then(|v| std::env::split_paths(v).find(|p| !p.as_os_str().is_empty()))
    {
        return Ok(p);
    }
    dirs::home_dir()
        .map(|home| home.join(".kube").join("config"))
        .ok_or_else(|| Error::Configuration("unable to find home dir".into()))
}

/// Build a `kube::Client` from the kubeconfig at `path`, using `context` or
/// the file's current context.
pub async fn build_client(path: &Path, context: Option<&str>) -> Result<Client> {
    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
        Error::Configuration(format!("failed to read kubeconfig {}: {e}", path.display()))
    })?;

    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(|e| match context {
            Some(ctx) => Error::Configuration(format!("failed to load context '{ctx}': {e}")),
            None => Error::Configuration(format!("failed to load kubeconfig: {e}")),
        })?;

    Client::try_from(config)
        .map_err(|e| Error::Configuration(format!("failed to build Kubernetes client: {e}")))
}

/// Name of the context a run will use, for log lines.
pub fn effective_context(path: &Path, context: Option<&str>) -> String {
    if let Some(ctx) = context {
        return ctx.to_string();
    }
    Kubeconfig::read_from(path)
        .ok()
        .and_then(|cfg| cfg.current_context)
        .unwrap_or_else(|| "unknown".to_string())
}
