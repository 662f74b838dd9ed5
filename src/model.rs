//! Snapshots of the cluster objects the diagnostic reads.
//!
//! These are deliberately smaller than the API types: only what the filter,
//! the selector and the report need survives the conversion.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::{
    api::{core::v1::Pod, policy::v1::PodDisruptionBudget},
    apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
};
use kube::ResourceExt;
use serde::Serialize;

/// `minAvailable` / `maxUnavailable` as written in the PDB spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum IntOrPercent {
    Int(i32),
    Percent(String),
}

impl From<&IntOrString> for IntOrPercent {
    fn from(v: &IntOrString) -> Self {
        match v {
            IntOrString::Int(i) => Self::Int(*i),
            IntOrString::String(s) => Self::Percent(s.clone()),
        }
    }
}

impl fmt::Display for IntOrPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Percent(s) => f.write_str(s),
        }
    }
}

/// Point-in-time view of a PodDisruptionBudget.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdbSnapshot {
    pub name: String,
    pub namespace: String,
    pub selector: Option<LabelSelector>,
    pub disruptions_allowed: i32,
    pub current_healthy: i32,
    pub desired_healthy: i32,
    pub expected_pods: i32,
    pub min_available: Option<IntOrPercent>,
    pub max_unavailable: Option<IntOrPercent>,
}

impl PdbSnapshot {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// `true` when no pod covered by this budget may be evicted right now.
    pub fn is_blocking(&self) -> bool {
        self.disruptions_allowed == 0
    }
}

impl From<&PodDisruptionBudget> for PdbSnapshot {
    fn from(pdb: &PodDisruptionBudget) -> Self {
        let spec = pdb.spec.as_ref();
        // No status yet means the disruption controller hasn't computed
        // anything, and the eviction API refuses every request meanwhile.
        let status = pdb.status.as_ref();
        Self {
            name: pdb.name_any(),
            namespace: pdb.namespace().unwrap_or_default(),
            selector: spec.and_then(|s| s.selector.clone()),
            disruptions_allowed: status.map_or(0, |s| s.disruptions_allowed),
            current_healthy: status.map_or(0, |s| s.current_healthy),
            desired_healthy: status.map_or(0, |s| s.desired_healthy),
            expected_pods: status.map_or(0, |s| s.expected_pods),
            min_available: spec
                .and_then(|s| s.min_available.as_ref())
                .map(IntOrPercent::from),
            max_unavailable: spec
                .and_then(|s| s.max_unavailable.as_ref())
                .map(IntOrPercent::from),
        }
    }
}

/// Pod lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl PodPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        }
    }

    /// Parse the API's phase string. Anything unrecognised is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ContainerReadiness {
    pub ready: bool,
}

/// Cache identity of a pod.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Point-in-time view of a Pod.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PodSnapshot {
    pub name: String,
    pub namespace: String,
    pub phase: PodPhase,
    pub labels: BTreeMap<String, String>,
    pub container_statuses: Vec<ContainerReadiness>,
}

impl PodSnapshot {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_phase(mut self, phase: PodPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Append one container status per entry of `ready`.
    pub fn with_containers(mut self, ready: &[bool]) -> Self {
        self.container_statuses
            .extend(ready.iter().map(|&ready| ContainerReadiness { ready }));
        self
    }

    pub fn key(&self) -> PodKey {
        PodKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// `name/namespace`, the form used on report lines.
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.name, self.namespace)
    }
}

impl From<&Pod> for PodSnapshot {
    fn from(pod: &Pod) -> Self {
        let status = pod.status.as_ref();
        Self {
            name: pod.name_any(),
            namespace: pod.namespace().unwrap_or_default(),
            phase: status
                .and_then(|s| s.phase.as_deref())
                .map_or(PodPhase::Unknown, PodPhase::parse),
            labels: pod.labels().clone(),
            container_statuses: status
                .and_then(|s| s.container_statuses.as_ref())
                .map(|css| {
                    css.iter()
                        .map(|cs| ContainerReadiness { ready: cs.ready })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}
