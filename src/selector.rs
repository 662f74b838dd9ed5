//! Label selector evaluation.
//!
//! A PDB's `spec.selector` is compiled into a [`Selector`]: a flat list of
//! [`Term`]s that must all hold for a pod to match. The algebra is the one
//! Kubernetes defines for `matchLabels` and `matchExpressions`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use crate::error::{Error, Result};
use crate::k8s::cache::PodCache;
use crate::model::{PdbSnapshot, PodSnapshot};

/// A single requirement on a label set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Equals(String, String),
    In(String, BTreeSet<String>),
    /// Also satisfied when the key is absent.
    NotIn(String, BTreeSet<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Term {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Equals(k, v) => labels.get(k) == Some(v),
            Self::In(k, set) => labels.get(k).is_some_and(|v| set.contains(v)),
            Self::NotIn(k, set) => labels.get(k).is_none_or(|v| !set.contains(v)),
            Self::Exists(k) => labels.contains_key(k),
            Self::DoesNotExist(k) => !labels.contains_key(k),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(",");
        match self {
            Self::Equals(k, v) => write!(f, "{k}={v}"),
            Self::In(k, set) => write!(f, "{k} in ({})", join(set)),
            Self::NotIn(k, set) => write!(f, "{k} notin ({})", join(set)),
            Self::Exists(k) => f.write_str(k),
            Self::DoesNotExist(k) => write!(f, "!{k}"),
        }
    }
}

/// Conjunction of terms. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    terms: Vec<Term>,
}

impl Selector {
    /// Compile a PDB selector.
    ///
    /// An absent or empty selector is rejected rather than treated as
    /// "everything": a budget is always meant to scope a concrete workload.
    pub fn resolve(spec: Option<&LabelSelector>) -> Result<Self> {
        let spec = spec.ok_or_else(|| Error::InvalidSelector("selector is missing".into()))?;

        let mut terms = Vec::new();

        for (key, value) in spec.match_labels.iter().flatten() {
            validate_key(key)?;
            validate_value(key, value)?;
            terms.push(Term::Equals(key.clone(), value.clone()));
        }

        for req in spec.match_expressions.iter().flatten() {
            validate_key(&req.key)?;
            let values = req.values.as_deref().unwrap_or_default();
            for v in values {
                validate_value(&req.key, v)?;
            }
            let set = || values.iter().cloned().collect::<BTreeSet<_>>();

            let term = match req.operator.as_str() {
                "In" | "NotIn" if values.is_empty() => {
                    return Err(Error::InvalidSelector(format!(
                        "operator {} on key {:?} requires at least one value",
                        req.operator, req.key
                    )));
                }
                "Exists" | "DoesNotExist" if !values.is_empty() => {
                    return Err(Error::InvalidSelector(format!(
                        "operator {} on key {:?} must not carry values",
                        req.operator, req.key
                    )));
                }
                "In" => Term::In(req.key.clone(), set()),
                "NotIn" => Term::NotIn(req.key.clone(), set()),
                "Exists" => Term::Exists(req.key.clone()),
                "DoesNotExist" => Term::DoesNotExist(req.key.clone()),
                other => {
                    return Err(Error::InvalidSelector(format!(
                        "unknown operator {other:?} on key {:?}",
                        req.key
                    )));
                }
            };
            terms.push(term);
        }

        if terms.is_empty() {
            return Err(Error::InvalidSelector("selector is empty".into()));
        }
        check_satisfiable(&terms)?;

        Ok(Self { terms })
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// `true` when every term holds for `labels`.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.terms.iter().all(|t| t.matches(labels))
    }

    pub fn matches_pod(&self, pod: &PodSnapshot) -> bool {
        self.matches(&pod.labels)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{term}")?;
        }
        Ok(())
    }
}

/// Reject selectors whose terms on one key can never hold together,
/// e.g. `app=a` with `app in (b)`, or `Exists` with `DoesNotExist`.
fn check_satisfiable(terms: &[Term]) -> Result<()> {
    #[derive(Default)]
    struct KeyConstraint {
        present: bool,
        absent: bool,
        /// Intersection of every `Equals`/`In` value set on the key.
        allowed: Option<BTreeSet<String>>,
        excluded: BTreeSet<String>,
    }

    let mut by_key: BTreeMap<&str, KeyConstraint> = BTreeMap::new();
    for term in terms {
        let (key, restrict) = match term {
            Term::Equals(k, v) => (k, Some(BTreeSet::from([v.clone()]))),
            Term::In(k, set) => (k, Some(set.clone())),
            Term::NotIn(k, set) => {
                by_key.entry(k).or_default().excluded.extend(set.iter().cloned());
                continue;
            }
            Term::Exists(k) => (k, None),
            Term::DoesNotExist(k) => {
                by_key.entry(k).or_default().absent = true;
                continue;
            }
        };
        let c = by_key.entry(key).or_default();
        c.present = true;
        if let Some(set) = restrict {
            c.allowed = Some(match c.allowed.take() {
                Some(prev) => prev.intersection(&set).cloned().collect(),
                None => set,
            });
        }
    }

    for (key, c) in &by_key {
        if c.present && c.absent {
            return Err(Error::InvalidSelector(format!(
                "conflicting terms on key {key:?}: required and forbidden"
            )));
        }
        if let Some(allowed) = &c.allowed {
            if allowed.difference(&c.excluded).next().is_none() {
                return Err(Error::InvalidSelector(format!(
                    "conflicting terms on key {key:?}: no value satisfies all of them"
                )));
            }
        }
    }
    Ok(())
}

/// Resolve `pdb`'s selector and return the cached pods it covers.
///
/// Like a lister query, every cached pod is considered regardless of
/// namespace; narrow the run with `--namespace` to scope it.
pub fn matching_pods(cache: &PodCache, pdb: &PdbSnapshot) -> Result<(Selector, Vec<PodSnapshot>)> {
    let selector = Selector::resolve(pdb.selector.as_ref())?;
    let pods = cache.query(&selector)?;
    Ok((selector, pods))
}

// ─── Syntax checks ────────────────────────────────────────────────────────────

const NAME_MAX: usize = 63;
const PREFIX_MAX: usize = 253;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// `[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?`, at most 63 chars.
fn is_qualified_name_part(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= NAME_MAX
        && s.chars().all(is_name_char)
        && s.starts_with(|c: char| c.is_ascii_alphanumeric())
        && s.ends_with(|c: char| c.is_ascii_alphanumeric())
}

/// Lowercase RFC 1123 subdomain.
fn is_dns_subdomain(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= PREFIX_MAX
        && s.split('.').all(|label| {
            !label.is_empty()
                && label
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
                && !label.starts_with('-')
                && !label.ends_with('-')
        })
}

fn validate_key(key: &str) -> Result<()> {
    let valid = match key.split_once('/') {
        Some((prefix, name)) => is_dns_subdomain(prefix) && is_qualified_name_part(name),
        None => is_qualified_name_part(key),
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidSelector(format!("invalid label key {key:?}")))
    }
}

fn validate_value(key: &str, value: &str) -> Result<()> {
    // Empty values are legal label values.
    if value.is_empty() || is_qualified_name_part(value) {
        Ok(())
    } else {
        Err(Error::InvalidSelector(format!(
            "invalid value {value:?} for label key {key:?}"
        )))
    }
}
