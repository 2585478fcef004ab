#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use workload_operator::readiness::{WorkloadState, WorkloadStatus};
use workload_operator::surface::{ApplyError, RelationDataSink, StatusPublisher, WorkloadControl};
use workload_operator::synthesis::RuntimeConfiguration;

const WAIT_LIMIT: Duration = Duration::from_secs(30);

/// In-memory workload that records every apply and can be told to fail,
/// stall or withhold image confirmation.
#[derive(Clone)]
pub struct MockWorkload {
    inner: Arc<Mutex<MockWorkloadState>>,
    gated: Arc<AtomicBool>,
    gate: Arc<Semaphore>,
    apply_started: Arc<Notify>,
}

#[derive(Default)]
struct MockWorkloadState {
    applied: Vec<RuntimeConfiguration>,
    apply_attempts: usize,
    restarts: usize,
    staged_image: Option<String>,
    running_image: Option<String>,
    apply_failures: VecDeque<String>,
    image_query_failures: usize,
    withhold_confirmation: bool,
}

impl Default for MockWorkload {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockWorkloadState::default())),
            gated: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(Semaphore::new(0)),
            apply_started: Arc::new(Notify::new()),
        }
    }
}

impl MockWorkload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_applies(&self, messages: impl IntoIterator<Item = &'static str>) {
        let mut inner = self.inner.lock().expect("mock workload state");
        inner
            .apply_failures
            .extend(messages.into_iter().map(str::to_string));
    }

    pub fn fail_next_image_queries(&self, count: usize) {
        self.inner.lock().expect("mock workload state").image_query_failures = count;
    }

    /// Makes `restart` leave the previous image running until
    /// [`MockWorkload::confirm_running_image`] is called.
    pub fn withhold_image_confirmation(&self) {
        self.inner
            .lock()
            .expect("mock workload state")
            .withhold_confirmation = true;
    }

    pub fn confirm_running_image(&self) {
        let mut inner = self.inner.lock().expect("mock workload state");
        inner.withhold_confirmation = false;
        inner.running_image = inner.staged_image.clone();
    }

    /// Blocks every subsequent `apply` until [`MockWorkload::release_apply`].
    pub fn hold_applies(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn release_apply(&self) {
        self.gate.add_permits(1);
    }

    pub async fn wait_for_apply_started(&self) {
        tokio::time::timeout(WAIT_LIMIT, self.apply_started.notified())
            .await
            .expect("apply should start");
    }

    pub fn applied(&self) -> Vec<RuntimeConfiguration> {
        self.inner.lock().expect("mock workload state").applied.clone()
    }

    pub fn apply_count(&self) -> usize {
        self.inner.lock().expect("mock workload state").applied.len()
    }

    pub fn apply_attempts(&self) -> usize {
        self.inner.lock().expect("mock workload state").apply_attempts
    }

    pub fn restarts(&self) -> usize {
        self.inner.lock().expect("mock workload state").restarts
    }
}

#[async_trait]
impl WorkloadControl for MockWorkload {
    async fn apply(&self, config: &RuntimeConfiguration) -> Result<(), ApplyError> {
        {
            let mut inner = self.inner.lock().expect("mock workload state");
            inner.apply_attempts += 1;
        }
        self.apply_started.notify_one();

        if self.gated.load(Ordering::SeqCst) {
            self.gate
                .acquire()
                .await
                .expect("gate semaphore open")
                .forget();
        }

        let mut inner = self.inner.lock().expect("mock workload state");
        if let Some(message) = inner.apply_failures.pop_front() {
            return Err(ApplyError::Workload(message));
        }
        inner.staged_image = Some(config.image().to_string());
        inner.applied.push(config.clone());
        Ok(())
    }

    async fn restart(&self) -> Result<(), ApplyError> {
        let mut inner = self.inner.lock().expect("mock workload state");
        inner.restarts += 1;
        if !inner.withhold_confirmation {
            inner.running_image = inner.staged_image.clone();
        }
        Ok(())
    }

    async fn current_image_ref(&self) -> Result<Option<String>, ApplyError> {
        let mut inner = self.inner.lock().expect("mock workload state");
        if inner.image_query_failures > 0 {
            inner.image_query_failures -= 1;
            return Err(ApplyError::Workload("container runtime unavailable".to_string()));
        }
        Ok(inner.running_image.clone())
    }
}

/// Records published statuses and lets tests await a particular state.
#[derive(Clone, Default)]
pub struct MockPublisher {
    statuses: Arc<Mutex<Vec<WorkloadStatus>>>,
    published: Arc<Notify>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<WorkloadStatus> {
        self.statuses.lock().expect("publisher state").clone()
    }

    pub fn last(&self) -> Option<WorkloadStatus> {
        self.statuses.lock().expect("publisher state").last().cloned()
    }

    pub fn count(&self) -> usize {
        self.statuses.lock().expect("publisher state").len()
    }

    pub async fn wait_for(&self, state: WorkloadState) -> WorkloadStatus {
        let wait = async {
            loop {
                let notified = self.published.notified();
                if let Some(status) = self.last().filter(|status| status.state == state) {
                    return status;
                }
                notified.await;
            }
        };
        tokio::time::timeout(WAIT_LIMIT, wait)
            .await
            .unwrap_or_else(|_| panic!("status {} was never published", state.as_str()))
    }
}

#[async_trait]
impl StatusPublisher for MockPublisher {
    async fn publish(&self, status: &WorkloadStatus) {
        self.statuses
            .lock()
            .expect("publisher state")
            .push(status.clone());
        self.published.notify_waiters();
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedRelationData {
    pub relation: String,
    pub source: String,
    pub data: BTreeMap<String, String>,
}

#[derive(Clone, Default)]
pub struct MockRelationSink {
    published: Arc<Mutex<Vec<PublishedRelationData>>>,
}

impl MockRelationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<PublishedRelationData> {
        self.published.lock().expect("relation sink state").clone()
    }
}

#[async_trait]
impl RelationDataSink for MockRelationSink {
    async fn publish_local(
        &self,
        relation: &str,
        source: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<(), ApplyError> {
        self.published
            .lock()
            .expect("relation sink state")
            .push(PublishedRelationData {
                relation: relation.to_string(),
                source: source.to_string(),
                data: data.clone(),
            });
        Ok(())
    }
}
