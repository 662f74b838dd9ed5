//! Blocking-PDB reports and the sink that renders them.

use std::fmt;
use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::model::{IntOrPercent, PdbSnapshot, PodSnapshot};
use crate::selector::Selector;

const SEPARATOR: &str = "-----------------------------------";

/// Ready containers over total containers. Display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub ready: usize,
    pub total: usize,
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}/{})", self.ready, self.total)
    }
}

pub fn readiness(pod: &PodSnapshot) -> Readiness {
    Readiness {
        ready: pod.container_statuses.iter().filter(|c| c.ready).count(),
        total: pod.container_statuses.len(),
    }
}

/// A blocking PDB together with the live pods it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockingReport {
    pub pdb: PdbSnapshot,
    pub selector: String,
    pub matched_pods: Vec<PodSnapshot>,
}

/// Pair `pdb` with its pods, matched by the already resolved `selector`. A
/// budget covering no live pod is not actionable and yields `None`.
pub fn build(
    pdb: PdbSnapshot,
    selector: &Selector,
    matched_pods: Vec<PodSnapshot>,
) -> Option<BlockingReport> {
    if matched_pods.is_empty() {
        return None;
    }
    Some(BlockingReport {
        pdb,
        selector: selector.to_string(),
        matched_pods,
    })
}

impl BlockingReport {
    /// The budget's threshold as `key=value`. `maxUnavailable` is shown only
    /// when `minAvailable` is unset.
    fn threshold(&self) -> (&'static str, String) {
        match (&self.pdb.min_available, &self.pdb.max_unavailable) {
            (Some(min), _) => ("min-available", min.to_string()),
            (None, Some(max)) => ("max-unavailable", max.to_string()),
            (None, None) => ("min-available", "<unset>".to_string()),
        }
    }

    fn header_line(&self) -> String {
        let (key, value) = self.threshold();
        format!(
            "pdb {} doesn't allow disruptions namespace={} selector={} current-healthy={} expected-pods={} {key}={value}",
            self.pdb.name,
            self.pdb.namespace,
            self.selector,
            self.pdb.current_healthy,
            self.pdb.expected_pods,
        )
    }

    fn pod_line(pod: &PodSnapshot) -> String {
        format!(
            "pod {} phase {} ready {}",
            pod.display_name(),
            pod.phase,
            readiness(pod)
        )
    }
}

// ─── Output sink ──────────────────────────────────────────────────────────────

/// How reports are written to the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Separator, header line, one line per pod
    #[default]
    Text,
    /// One JSON object per report
    Json,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    pdb: &'a str,
    namespace: &'a str,
    selector: &'a str,
    current_healthy: i32,
    desired_healthy: i32,
    expected_pods: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_available: Option<&'a IntOrPercent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_unavailable: Option<&'a IntOrPercent>,
    pods: Vec<JsonPod<'a>>,
}

#[derive(Serialize)]
struct JsonPod<'a> {
    name: &'a str,
    namespace: &'a str,
    phase: &'static str,
    ready: String,
}

/// Writes reports to `out` and mirrors them as structured log records.
pub struct Reporter<W: Write> {
    out: W,
    format: OutputFormat,
    emitted: usize,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self {
            out,
            format,
            emitted: 0,
        }
    }

    pub fn emit(&mut self, report: &BlockingReport) -> io::Result<()> {
        log_report(report);

        match self.format {
            OutputFormat::Text => {
                writeln!(self.out, "{SEPARATOR}")?;
                writeln!(self.out, "{}", report.header_line())?;
                for pod in &report.matched_pods {
                    writeln!(self.out, "{}", BlockingReport::pod_line(pod))?;
                }
            }
            OutputFormat::Json => {
                let json = JsonReport {
                    pdb: &report.pdb.name,
                    namespace: &report.pdb.namespace,
                    selector: &report.selector,
                    current_healthy: report.pdb.current_healthy,
                    desired_healthy: report.pdb.desired_healthy,
                    expected_pods: report.pdb.expected_pods,
                    min_available: report.pdb.min_available.as_ref(),
                    max_unavailable: report.pdb.max_unavailable.as_ref(),
                    pods: report
                        .matched_pods
                        .iter()
                        .map(|p| JsonPod {
                            name: &p.name,
                            namespace: &p.namespace,
                            phase: p.phase.as_str(),
                            ready: readiness(p).to_string(),
                        })
                        .collect(),
                };
                serde_json::to_writer(&mut self.out, &json)?;
                writeln!(self.out)?;
            }
        }

        self.out.flush()?;
        self.emitted += 1;
        Ok(())
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Flush and consume the sink, returning the number of reports written.
    pub fn finish(mut self) -> io::Result<usize> {
        self.out.flush()?;
        Ok(self.emitted)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn log_report(report: &BlockingReport) {
    let (threshold, value) = report.threshold();
    info!(
        pdb = %report.pdb.name,
        namespace = %report.pdb.namespace,
        selector = %report.selector,
        current_healthy = report.pdb.current_healthy,
        expected_pods = report.pdb.expected_pods,
        threshold,
        threshold_value = %value,
        "pdb {} doesn't allow disruptions",
        report.pdb.name
    );
    for pod in &report.matched_pods {
        info!(
            pdb = %report.pdb.name,
            pod = %pod.display_name(),
            phase = %pod.phase,
            ready = %readiness(pod),
            "covered pod"
        );
    }
}
