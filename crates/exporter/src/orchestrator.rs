//! The polling control loop.
//!
//! A single task owns all scheduling: wildcard discovery on one timer,
//! polling passes on another, an optional one-shot on-init replay, and the
//! stop signal. Passes run inline, so only one is ever in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pipewatch_core::{Config, Project};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::directory::Directory;
use crate::discovery::discover_wildcards;
use crate::error::PollError;
use crate::metrics::Metrics;
use crate::poller::{PollReport, Poller};
use crate::pool::run_pass;
use crate::store::ProjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Running,
    Stopped,
}

/// How a drained pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassEnd {
    Completed,
    Stopped,
}

/// Tally of one pass, for the summary log line.
#[derive(Debug, Default)]
struct PassTally {
    succeeded: usize,
    failed: usize,
    pipelines: usize,
}

pub struct Orchestrator {
    config: Config,
    store: Arc<ProjectStore>,
    directory: Directory,
    poller: Arc<Poller>,
    workers: usize,
    cancel: Arc<AtomicBool>,
    state: watch::Sender<OrchestratorState>,
}

impl Orchestrator {
    /// Seed the project store from `config.projects`.
    pub fn new(config: Config, directory: Directory, metrics: Arc<Metrics>) -> Self {
        let store = Arc::new(ProjectStore::new(config.projects.iter().cloned()));
        let poller = Arc::new(Poller::new(
            directory.clone(),
            metrics,
            config.defaults.clone(),
        ));
        let workers = config.resolved_polling_workers();
        let (state, _) = watch::channel(OrchestratorState::Running);

        Self {
            config,
            store,
            directory,
            poller,
            workers,
            cancel: Arc::new(AtomicBool::new(false)),
            state,
        }
    }

    pub fn store(&self) -> &Arc<ProjectStore> {
        &self.store
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.borrow()
    }

    /// Watch state transitions. `Stopped` is published exactly once.
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.state.subscribe()
    }

    /// Spawn the control loop and return its handle.
    ///
    /// `stop` ends the loop when it fires or its sender is dropped. `on_init`
    /// triggers one replay when it fires; a dropped sender disables it.
    pub fn orchestrate_polling(
        self: Arc<Self>,
        stop: oneshot::Receiver<()>,
        on_init: oneshot::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.control_loop(stop, on_init).await })
    }

    async fn control_loop(
        self: Arc<Self>,
        stop: oneshot::Receiver<()>,
        on_init: oneshot::Receiver<()>,
    ) {
        info!(
            workers = self.workers,
            projects = self.store.len(),
            wildcards = self.config.wildcards.len(),
            "Polling started"
        );
        self.run(stop, on_init).await;

        self.state.send_replace(OrchestratorState::Stopped);
        info!("Polling stopped");
    }

    /// Returns once stop fires or its sender is dropped.
    async fn run(&self, mut stop: oneshot::Receiver<()>, mut on_init: oneshot::Receiver<()>) {
        if self.discovery_pass(&mut stop).await == PassEnd::Stopped {
            return;
        }

        let discover_every = self.config.wildcards_discover_interval();
        let mut discovery = time::interval_at(Instant::now() + discover_every, discover_every);
        discovery.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let mut polling = time::interval(self.config.refs_polling_interval());
        polling.set_missed_tick_behavior(MissedTickBehavior::Burst);

        let mut on_init_pending = true;

        loop {
            let end = tokio::select! {
                _ = &mut stop => {
                    self.cancel.store(true, Ordering::Relaxed);
                    PassEnd::Stopped
                }
                _ = discovery.tick() => self.discovery_pass(&mut stop).await,
                _ = polling.tick() => self.polling_pass(&mut stop).await,
                signal = &mut on_init, if on_init_pending => {
                    on_init_pending = false;
                    match signal {
                        Ok(()) => self.on_init_replay(&mut stop).await,
                        Err(_) => {
                            debug!("On-init sender dropped, replay disabled");
                            PassEnd::Completed
                        }
                    }
                }
            };
            if end == PassEnd::Stopped {
                return;
            }
        }
    }

    /// Wildcard discovery, abandoned as soon as stop fires. Projects already
    /// appended stay in the store.
    async fn discovery_pass(&self, stop: &mut oneshot::Receiver<()>) -> PassEnd {
        if self.config.wildcards.is_empty() {
            return PassEnd::Completed;
        }
        tokio::select! {
            _ = &mut *stop => {
                info!("Stop requested, abandoning wildcard discovery");
                self.cancel.store(true, Ordering::Relaxed);
                PassEnd::Stopped
            }
            _ = discover_wildcards(&self.directory, &self.config.wildcards, &self.store) => {
                PassEnd::Completed
            }
        }
    }

    /// One pass over the current project snapshot.
    async fn polling_pass(&self, stop: &mut oneshot::Receiver<()>) -> PassEnd {
        let projects: Vec<Project> = self.store.snapshot().iter().cloned().collect();
        debug!(projects = projects.len(), "Polling pass");

        let poller = Arc::clone(&self.poller);
        let results = run_pass(
            projects,
            self.workers,
            Arc::clone(&self.cancel),
            move |project: Project| {
                let poller = Arc::clone(&poller);
                async move { poller.poll(&project).await }
            },
        );
        self.drain("polling", results, stop).await
    }

    /// Poll the refs found in each configured project's recent pipelines.
    async fn on_init_replay(&self, stop: &mut oneshot::Receiver<()>) -> PassEnd {
        let depth = self.config.on_init_fetch_depth;
        info!(
            projects = self.config.projects.len(),
            depth, "On-init replay"
        );

        let poller = Arc::clone(&self.poller);
        let results = run_pass(
            self.config.projects.clone(),
            self.workers,
            Arc::clone(&self.cancel),
            move |project: Project| {
                let poller = Arc::clone(&poller);
                async move { poller.replay(&project, depth).await }
            },
        );
        self.drain("on-init", results, stop).await
    }

    /// Log every result of a pass until its stream closes. A stop arriving
    /// meanwhile raises the cancel flag; in-flight work is still drained.
    async fn drain(
        &self,
        pass: &'static str,
        mut results: mpsc::UnboundedReceiver<Result<PollReport, PollError>>,
        stop: &mut oneshot::Receiver<()>,
    ) -> PassEnd {
        let mut tally = PassTally::default();
        let mut end = PassEnd::Completed;

        loop {
            tokio::select! {
                _ = &mut *stop, if end == PassEnd::Completed => {
                    info!(pass, "Stop requested, draining in-flight work");
                    self.cancel.store(true, Ordering::Relaxed);
                    end = PassEnd::Stopped;
                }
                next = results.recv() => match next {
                    Some(result) => record(&mut tally, result),
                    None => break,
                },
            }
        }

        info!(
            pass,
            succeeded = tally.succeeded,
            failed = tally.failed,
            pipelines = tally.pipelines,
            "Pass complete"
        );
        end
    }
}

/// Wait for the control loop to finish, at most `grace`. Past that the task
/// is aborted and in-flight polls are abandoned. Returns whether the loop
/// finished on its own.
pub async fn join_within(handle: JoinHandle<()>, grace: Duration) -> bool {
    let abort = handle.abort_handle();
    match time::timeout(grace, handle).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "Polling task failed");
            true
        }
        Err(_) => {
            abort.abort();
            warn!(grace = ?grace, "Polling did not stop in time, abandoning in-flight work");
            false
        }
    }
}

fn record(tally: &mut PassTally, result: Result<PollReport, PollError>) {
    match result {
        Ok(report) => {
            tally.succeeded += 1;
            tally.pipelines += report.pipelines_published;
        }
        Err(e) => {
            tally.failed += 1;
            warn!(project = %e.project(), error = %e, "Project skipped this pass");
        }
    }
}
