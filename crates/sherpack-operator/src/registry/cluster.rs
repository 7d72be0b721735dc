//! Watch registry backed by Kubernetes watches
//!
//! Each subscription resolves the kind through discovery, then runs a
//! `kube::runtime::watcher` stream on its own task. Raw watcher events are
//! turned into create/update/delete events against a local object cache,
//! filtered, and handed to the subscription's handler wrapped in a
//! [`RequeueFilter`], which enqueues owners on the controller's work queue.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{Api, DynamicObject};
use kube::core::GroupVersionKind;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Client, discovery};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{WatchRegistry, kind_label};
use crate::error::{OperatorError, Result};
use crate::event::{DependentEvent, EventFilter, ReconcileRequest, allows_all};
use crate::handler::{DependentHandler, EnqueueHandler};
use crate::queue::WorkQueue;
use crate::requeue::RequeueFilter;

/// Watch registry starting one cluster-wide watch per subscribed kind
pub struct KubeWatchRegistry {
    /// Kubernetes client
    client: Client,
    /// Queue reconcile requests are delivered to
    queue: WorkQueue<ReconcileRequest>,
    /// Running watch tasks
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl KubeWatchRegistry {
    /// Create a registry delivering into `queue`
    pub fn new(client: Client, queue: WorkQueue<ReconcileRequest>) -> Self {
        Self {
            client,
            queue,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The queue reconcile requests are delivered to
    pub fn queue(&self) -> &WorkQueue<ReconcileRequest> {
        &self.queue
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of watches still running
    pub fn active_watches(&self) -> usize {
        self.tasks().iter().filter(|t| !t.is_finished()).count()
    }

    /// Stop every watch
    pub fn shutdown(&self) {
        for task in self.tasks().drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl WatchRegistry for KubeWatchRegistry {
    async fn subscribe(
        &self,
        kind: &GroupVersionKind,
        handler: DependentHandler,
        filters: Vec<EventFilter>,
    ) -> Result<()> {
        let label = kind_label(kind);
        let (resource, _capabilities) = discovery::pinned_kind(&self.client, kind)
            .await
            .map_err(|e| OperatorError::Subscription {
                kind: label.clone(),
                message: e.to_string(),
            })?;

        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
        let mut config = watcher::Config::default();
        if let Some(selector) = label_selector(&filters) {
            config = config.labels(&selector);
        }

        let handler = RequeueFilter::new(handler);
        let queue = self.queue.clone();
        let task_label = label.clone();
        let task = tokio::spawn(async move {
            let mut translator = EventTranslator::default();
            let mut events = watcher(api, config).default_backoff().boxed();

            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        for event in translator.translate(event) {
                            if allows_all(&filters, &event) {
                                handler.handle(&event, &queue);
                            }
                        }
                    }
                    Err(e) => warn!(kind = %task_label, error = %e, "dependent watch error"),
                }
            }
            debug!(kind = %task_label, "dependent watch stream ended");
        });

        self.tasks().push(task);
        info!(kind = %label, "started dependent watch");
        Ok(())
    }
}

/// Server-side label selector for the label filters, if any
fn label_selector(filters: &[EventFilter]) -> Option<String> {
    let labels: BTreeMap<&str, &str> = filters
        .iter()
        .filter_map(|f| match f {
            EventFilter::MatchLabels(labels) => Some(labels),
            EventFilter::DependentChanges => None,
        })
        .flatten()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    if labels.is_empty() {
        return None;
    }
    Some(
        labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(","),
    )
}

type ObjectKey = (Option<String>, String);

fn object_key(obj: &DynamicObject) -> Option<ObjectKey> {
    Some((obj.metadata.namespace.clone(), obj.metadata.name.clone()?))
}

/// Turns raw watcher events into dependent events
///
/// Keeps the last seen version of every object so applies can be told apart
/// as creates or updates, and objects missing from a relist become deletes.
#[derive(Default)]
struct EventTranslator {
    cache: HashMap<ObjectKey, DynamicObject>,
    relisted: Option<HashSet<ObjectKey>>,
}

impl EventTranslator {
    fn translate(&mut self, event: watcher::Event<DynamicObject>) -> Vec<DependentEvent> {
        match event {
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                if let (Some(seen), Some(key)) = (self.relisted.as_mut(), object_key(&obj)) {
                    seen.insert(key);
                }
                vec![self.apply(obj)]
            }
            watcher::Event::InitDone => {
                let Some(seen) = self.relisted.take() else {
                    return Vec::new();
                };
                let gone: Vec<ObjectKey> = self
                    .cache
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                gone.iter()
                    .filter_map(|key| self.cache.remove(key))
                    .map(DependentEvent::Delete)
                    .collect()
            }
            watcher::Event::Apply(obj) => vec![self.apply(obj)],
            watcher::Event::Delete(obj) => {
                if let Some(key) = object_key(&obj) {
                    self.cache.remove(&key);
                }
                vec![DependentEvent::Delete(obj)]
            }
        }
    }

    fn apply(&mut self, obj: DynamicObject) -> DependentEvent {
        let Some(key) = object_key(&obj) else {
            return DependentEvent::Generic(obj);
        };
        match self.cache.insert(key, obj.clone()) {
            Some(old) => DependentEvent::Update { old, new: obj },
            None => DependentEvent::Create(obj),
        }
    }
}
