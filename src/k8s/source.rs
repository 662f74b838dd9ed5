//! Read access to the cluster: the PDB list and the pod event stream.

use std::future::Future;

use futures::{stream::BoxStream, StreamExt};
use k8s_openapi::api::{core::v1::Pod, policy::v1::PodDisruptionBudget};
use kube::{
    api::{Api, ListParams},
    runtime::{watcher, WatchStreamExt},
    Client,
};

use crate::error::{Error, Result};
use crate::model::{PdbSnapshot, PodSnapshot};

/// One change to the pod set, as seen by the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum PodEvent {
    /// A full (re)list is starting; the pods that follow replace the cache.
    InitStarted,
    Added(PodSnapshot),
    Modified(PodSnapshot),
    Deleted(PodSnapshot),
    /// The (re)list is complete.
    InitDone,
}

pub type PodEventStream = BoxStream<'static, Result<PodEvent>>;

/// The cluster capabilities a run consumes.
pub trait ClusterSource {
    /// List PDBs in `namespace`, or in every namespace when `None`.
    fn list_pdbs(
        &self,
        namespace: Option<&str>,
    ) -> impl Future<Output = Result<Vec<PdbSnapshot>>> + Send;

    /// Long-lived list-then-watch of pods in `namespace` (all when `None`).
    fn watch_pods(&self, namespace: Option<&str>) -> PodEventStream;
}

/// [`ClusterSource`] backed by the API server.
#[derive(Clone)]
pub struct KubeSource {
    client: Client,
}

impl KubeSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

impl ClusterSource for KubeSource {
    async fn list_pdbs(&self, namespace: Option<&str>) -> Result<Vec<PdbSnapshot>> {
        let api: Api<PodDisruptionBudget> = self.api(namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::transport("list poddisruptionbudgets", e))?;
        Ok(list.items.iter().map(PdbSnapshot::from).collect())
    }

    fn watch_pods(&self, namespace: Option<&str>) -> PodEventStream {
        let api: Api<Pod> = self.api(namespace);
        watcher(api, watcher::Config::default())
            .default_backoff()
            .map(|ev| match ev {
                Ok(ev) => Ok(pod_event(ev)),
                Err(e) => Err(Error::transport("watch pods", e)),
            })
            .boxed()
    }
}

fn pod_event(ev: watcher::Event<Pod>) -> PodEvent {
    match ev {
        watcher::Event::Init => PodEvent::InitStarted,
        watcher::Event::InitApply(p) => PodEvent::Added(PodSnapshot::from(&p)),
        watcher::Event::Apply(p) => PodEvent::Modified(PodSnapshot::from(&p)),
        watcher::Event::Delete(p) => PodEvent::Deleted(PodSnapshot::from(&p)),
        watcher::Event::InitDone => PodEvent::InitDone,
    }
}
