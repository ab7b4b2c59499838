//! Test doubles shared by the contract tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use hostsync::error::{Error, Result};
use hostsync::runtime::EventStream;
use hostsync::types::{ContainerRecord, EventFilter, RuntimeEvent};
use hostsync::{Connection, ContainerRuntime, HostsFile, LabelExtractor, Reconciler};
use tokio::sync::mpsc;

/// Sender half of one scripted subscription.
pub type EventTx = mpsc::UnboundedSender<Result<RuntimeEvent>>;

/// A runtime whose containers, reachability and event streams are driven by
/// the test.
#[derive(Default)]
pub struct MockRuntime {
    reachable: AtomicBool,
    fail_listing: AtomicBool,
    containers: Mutex<Vec<ContainerRecord>>,
    subscriptions: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<RuntimeEvent>>>>,
    ping_calls: AtomicUsize,
    list_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
}

impl MockRuntime {
    pub fn reachable() -> Arc<Self> {
        let runtime = Self::default();
        runtime.reachable.store(true, Ordering::SeqCst);
        Arc::new(runtime)
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn set_containers(&self, containers: Vec<ContainerRecord>) {
        *self.containers.lock().unwrap() = containers;
    }

    /// Queues a subscription; the next `subscribe()` call receives whatever
    /// is sent on the returned sender.
    pub fn push_subscription(&self) -> EventTx {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions.lock().unwrap().push_back(rx);
        tx
    }

    pub fn ping_calls(&self) -> usize {
        self.ping_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ping(&self) -> Result<()> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Unavailable("mock runtime down".to_string()))
        }
    }

    async fn list_running(&self) -> Result<Vec<ContainerRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.load(Ordering::SeqCst) || self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("mock listing failed".to_string()));
        }
        Ok(self.containers.lock().unwrap().clone())
    }

    fn subscribe(&self, _filter: &EventFilter) -> EventStream {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        match self.subscriptions.lock().unwrap().pop_front() {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed(),
            None => stream::once(async {
                Err(Error::Stream("no scripted subscription".to_string()))
            })
            .boxed(),
        }
    }
}

pub fn container(id: &str, rules: &[(&str, &str)]) -> ContainerRecord {
    let labels: HashMap<String, String> = rules
        .iter()
        .map(|(router, rule)| (format!("traefik.http.routers.{router}.rule"), rule.to_string()))
        .collect();
    ContainerRecord {
        id: id.to_string(),
        name: Some(format!("/{id}")),
        labels,
    }
}

pub fn event(id: &str, action: &str) -> Result<RuntimeEvent> {
    Ok(RuntimeEvent::new(id, action))
}

/// Reconciler over `runtime` writing to `path`, connected iff `connected`.
pub fn reconciler(runtime: Arc<MockRuntime>, path: &Path, connected: bool) -> Arc<Reconciler> {
    let connection = Arc::new(Connection::with_state(runtime, connected));
    Arc::new(Reconciler::new(
        connection,
        Arc::new(HostsFile::new(path)),
        LabelExtractor::default(),
    ))
}

/// Polls `condition` every 10ms for up to two seconds.
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
