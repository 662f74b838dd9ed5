//! End-to-end tests for pdbstall::run::diagnose against an in-memory cluster.

use std::time::Duration;

use futures::{stream, StreamExt};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use pdbstall::error::{Error, Result};
use pdbstall::k8s::source::{ClusterSource, PodEvent, PodEventStream};
use pdbstall::model::{IntOrPercent, PdbSnapshot, PodPhase, PodSnapshot};
use pdbstall::report::{OutputFormat, Reporter};
use pdbstall::run::{diagnose, RunOptions, Summary};
use tokio_util::sync::CancellationToken;

// ── Fake cluster ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeCluster {
    pdbs: Vec<PdbSnapshot>,
    pods: Vec<PodSnapshot>,
    list_fails: bool,
    /// Never finish the initial pod list.
    stall_watch: bool,
}

impl ClusterSource for FakeCluster {
    async fn list_pdbs(&self, namespace: Option<&str>) -> Result<Vec<PdbSnapshot>> {
        if self.list_fails {
            return Err(Error::Transport {
                operation: "list poddisruptionbudgets",
                reason: "connection refused".into(),
            });
        }
        Ok(self
            .pdbs
            .iter()
            .filter(|p| namespace.is_none_or(|ns| p.namespace == ns))
            .cloned()
            .collect())
    }

    fn watch_pods(&self, namespace: Option<&str>) -> PodEventStream {
        let mut events = vec![PodEvent::InitStarted];
        if !self.stall_watch {
            events.extend(
                self.pods
                    .iter()
                    .filter(|p| namespace.is_none_or(|ns| p.namespace == ns))
                    .cloned()
                    .map(PodEvent::Added),
            );
            events.push(PodEvent::InitDone);
        }
        stream::iter(events.into_iter().map(Ok))
            .chain(stream::pending())
            .boxed()
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn app_selector(app: &str) -> Option<LabelSelector> {
    Some(LabelSelector {
        match_labels: Some([("app".to_string(), app.to_string())].into()),
        ..Default::default()
    })
}

fn pdb(ns: &str, name: &str, app: &str, allowed: i32) -> PdbSnapshot {
    PdbSnapshot {
        selector: app_selector(app),
        disruptions_allowed: allowed,
        ..PdbSnapshot::new(ns, name)
    }
}

fn pod(ns: &str, name: &str, app: &str, ready: &[bool]) -> PodSnapshot {
    PodSnapshot::new(ns, name)
        .with_phase(PodPhase::Running)
        .with_label("app", app)
        .with_containers(ready)
}

async fn run_with(cluster: &FakeCluster, opts: &RunOptions) -> (Result<Summary>, String) {
    let mut reporter = Reporter::new(Vec::new(), OutputFormat::Text);
    let result = diagnose(cluster, opts, &mut reporter, &CancellationToken::new()).await;
    let out = String::from_utf8(reporter.into_inner()).unwrap();
    (result, out)
}

async fn run(cluster: &FakeCluster) -> (Result<Summary>, String) {
    run_with(cluster, &RunOptions::default()).await
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reports_only_blocking_pdb_with_matching_pods() {
    let cluster = FakeCluster {
        pdbs: vec![
            PdbSnapshot {
                current_healthy: 1,
                min_available: Some(IntOrPercent::Int(2)),
                ..pdb("ns", "a", "a", 0)
            },
            pdb("ns", "b", "b", 1),
        ],
        pods: vec![pod("ns", "p1", "a", &[true, true])],
        ..Default::default()
    };

    let (result, out) = run(&cluster).await;
    let summary = result.unwrap();
    assert_eq!(
        summary,
        Summary {
            pdbs: 2,
            blocking: 1,
            reported: 1,
            invalid_selectors: 0
        }
    );
    assert!(out.contains("pdb a doesn't allow disruptions"), "got:\n{out}");
    assert!(out.contains("current-healthy=1 expected-pods=0 min-available=2"), "got:\n{out}");
    assert!(out.contains("pod p1/ns phase Running ready (2/2)"), "got:\n{out}");
    assert!(!out.contains("pdb b"), "non-blocking pdb reported:\n{out}");
}

#[tokio::test]
async fn blocking_pdb_without_live_pods_is_suppressed() {
    let cluster = FakeCluster {
        pdbs: vec![pdb("ns", "scaled-down", "gone", 0)],
        pods: vec![pod("ns", "p1", "other", &[true])],
        ..Default::default()
    };
    let (result, out) = run(&cluster).await;
    let summary = result.unwrap();
    assert_eq!(summary.blocking, 1);
    assert_eq!(summary.reported, 0);
    assert!(out.is_empty(), "expected no output, got:\n{out}");
}

#[tokio::test]
async fn reports_follow_pdb_list_order() {
    let cluster = FakeCluster {
        pdbs: vec![pdb("ns", "zeta", "z", 0), pdb("ns", "alpha", "a", 0)],
        pods: vec![pod("ns", "pa", "a", &[true]), pod("ns", "pz", "z", &[true])],
        ..Default::default()
    };
    let (result, out) = run(&cluster).await;
    assert_eq!(result.unwrap().reported, 2);
    let zeta = out.find("pdb zeta").unwrap();
    let alpha = out.find("pdb alpha").unwrap();
    assert!(zeta < alpha, "reports out of order:\n{out}");
}

#[tokio::test]
async fn invalid_selector_skips_only_that_pdb() {
    let broken = PdbSnapshot {
        selector: Some(LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "app".into(),
                operator: "Exists".into(),
                values: Some(vec!["x".into()]),
            }]),
            ..Default::default()
        }),
        ..pdb("ns", "broken", "", 0)
    };
    let no_selector = PdbSnapshot {
        selector: None,
        ..pdb("ns", "unscoped", "", 0)
    };
    let cluster = FakeCluster {
        pdbs: vec![broken, no_selector, pdb("ns", "good", "a", 0)],
        pods: vec![pod("ns", "p1", "a", &[false])],
        ..Default::default()
    };

    let (result, out) = run(&cluster).await;
    let summary = result.unwrap();
    assert_eq!(summary.invalid_selectors, 2);
    assert_eq!(summary.reported, 1);
    assert!(out.contains("pdb good"), "got:\n{out}");
    assert!(out.contains("ready (0/1)"), "got:\n{out}");
}

#[tokio::test]
async fn conflicting_selector_is_skipped_and_run_continues() {
    // app=a together with app In (b) can never match; neither can tier In/NotIn (x).
    let conflicting = PdbSnapshot {
        selector: Some(LabelSelector {
            match_labels: Some([("app".to_string(), "a".to_string())].into()),
            match_expressions: Some(vec![
                LabelSelectorRequirement {
                    key: "app".into(),
                    operator: "In".into(),
                    values: Some(vec!["b".into()]),
                },
                LabelSelectorRequirement {
                    key: "tier".into(),
                    operator: "In".into(),
                    values: Some(vec!["x".into()]),
                },
                LabelSelectorRequirement {
                    key: "tier".into(),
                    operator: "NotIn".into(),
                    values: Some(vec!["x".into()]),
                },
            ]),
        }),
        ..pdb("ns", "conflicting", "", 0)
    };
    let cluster = FakeCluster {
        pdbs: vec![conflicting, pdb("ns", "after", "a", 0)],
        pods: vec![pod("ns", "p1", "a", &[true])],
        ..Default::default()
    };

    let (result, out) = run(&cluster).await;
    let summary = result.unwrap();
    assert_eq!(
        summary,
        Summary {
            pdbs: 2,
            blocking: 2,
            reported: 1,
            invalid_selectors: 1
        }
    );
    assert!(!out.contains("pdb conflicting"), "got:\n{out}");
    assert!(out.contains("pdb after"), "got:\n{out}");
}

#[tokio::test]
async fn selector_matches_across_namespaces_when_unscoped() {
    let cluster = FakeCluster {
        pdbs: vec![pdb("ns-a", "a", "shared", 0)],
        pods: vec![
            pod("ns-a", "p1", "shared", &[true]),
            pod("ns-b", "p2", "shared", &[true]),
        ],
        ..Default::default()
    };
    let (result, out) = run(&cluster).await;
    result.unwrap();
    assert!(out.contains("pod p1/ns-a"), "got:\n{out}");
    assert!(out.contains("pod p2/ns-b"), "got:\n{out}");
}

#[tokio::test]
async fn namespace_option_scopes_pdbs_and_pods() {
    let cluster = FakeCluster {
        pdbs: vec![pdb("ns-a", "a", "shared", 0), pdb("ns-b", "b", "shared", 0)],
        pods: vec![
            pod("ns-a", "p1", "shared", &[true]),
            pod("ns-b", "p2", "shared", &[true]),
        ],
        ..Default::default()
    };
    let opts = RunOptions {
        namespace: Some("ns-a".into()),
        ..RunOptions::default()
    };
    let (result, out) = run_with(&cluster, &opts).await;
    assert_eq!(result.unwrap().reported, 1);
    assert!(out.contains("pdb a"));
    assert!(!out.contains("pdb b"));
    assert!(!out.contains("p2/ns-b"));
}

#[tokio::test]
async fn no_pdbs_is_a_clean_run() {
    let cluster = FakeCluster {
        pods: vec![pod("ns", "p1", "a", &[true])],
        ..Default::default()
    };
    let (result, out) = run(&cluster).await;
    assert_eq!(result.unwrap(), Summary::default());
    assert!(out.is_empty());
}

// ── Fatal paths ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn transport_error_is_fatal() {
    let cluster = FakeCluster {
        pdbs: vec![pdb("ns", "a", "a", 0)],
        list_fails: true,
        ..Default::default()
    };
    let (result, out) = run(&cluster).await;
    let err = result.unwrap_err();
    assert!(matches!(err, Error::Transport { .. }), "got {err:?}");
    assert!(err.is_fatal());
    assert!(err.to_string().contains("list poddisruptionbudgets"));
    assert!(out.is_empty());
}

#[tokio::test]
async fn sync_timeout_is_fatal_and_reports_nothing() {
    let cluster = FakeCluster {
        pdbs: vec![pdb("ns", "a", "a", 0)],
        pods: vec![pod("ns", "p1", "a", &[true])],
        stall_watch: true,
        ..Default::default()
    };
    let opts = RunOptions {
        sync_timeout: Duration::from_millis(50),
        ..RunOptions::default()
    };
    let (result, out) = run_with(&cluster, &opts).await;
    assert!(matches!(result, Err(Error::SyncTimeout(_))), "got {result:?}");
    assert!(out.is_empty());
}

#[tokio::test]
async fn cancelled_run_aborts() {
    let cluster = FakeCluster {
        pdbs: vec![pdb("ns", "a", "a", 0)],
        pods: vec![pod("ns", "p1", "a", &[true])],
        ..Default::default()
    };
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut reporter = Reporter::new(Vec::new(), OutputFormat::Text);
    let result = diagnose(&cluster, &RunOptions::default(), &mut reporter, &cancel).await;
    assert!(matches!(result, Err(Error::Cancelled)), "got {result:?}");
    assert_eq!(reporter.emitted(), 0);
}
