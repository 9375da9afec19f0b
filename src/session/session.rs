use std::{sync::Arc, time::Duration};

use futures::future::OptionFuture;
use log::{debug, error, info, warn};
use ndarray::Array1;
use tokio::sync::{mpsc, watch};

use super::{
    LogLine, SessionCommand, SessionEvent, SessionPhase, Viewport, ViewportDebouncer,
};
use crate::{
    animation::{build_plan, Direction, PlanTiming},
    config::{ConfigManager, ConfigUpdate, NetworkConfig},
    dataset::{self, Dataset},
    layout::{layout, Layout, LayoutOptions},
    model::{Predictor, Sequential},
    simulation::{ActivationSnapshot, ForwardSimulator, SampleSelector},
    topology::{self, Topology},
    training::{EpochReport, Trainer, TrainingHandle, TrainingJob},
    Result, VisErr,
};

const MAX_LOGS: usize = 200;

/// Tunables of a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Seeds weight initialization, training shuffles and sample picking.
    pub seed: u64,
    /// Always run forward passes on this dataset row instead of a random one.
    pub pinned_sample: Option<usize>,
    pub layout: LayoutOptions,
    pub timing: PlanTiming,
    pub debounce: Duration,
    pub viewport: Viewport,
    pub initial_config: NetworkConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            pinned_sample: None,
            layout: LayoutOptions::default(),
            timing: PlanTiming::default(),
            debounce: Duration::from_millis(50),
            viewport: Viewport::default(),
            initial_config: NetworkConfig::default(),
        }
    }
}

struct RunningTraining {
    generation: u64,
    last_epoch: usize,
    epochs: watch::Receiver<Option<EpochReport>>,
    handle: TrainingHandle,
}

/// The single owner of a session's config, dataset, topology, predictor and
/// layout.
///
/// Every topology or dataset replacement bumps the generation and cancels the
/// training in flight, whose results are then never looked at again.
pub struct Session {
    options: SessionOptions,
    config: ConfigManager,
    trainer: Box<dyn Trainer>,
    events: mpsc::UnboundedSender<SessionEvent>,

    dataset: Option<Arc<Dataset>>,
    topology: Topology,
    predictor: Option<Sequential>,
    layout: Option<Layout>,
    snapshot: Option<ActivationSnapshot>,
    simulator: ForwardSimulator,
    debouncer: ViewportDebouncer,
    viewport: Viewport,

    generation: u64,
    training: Option<RunningTraining>,
    phase: SessionPhase,
    logs: Vec<LogLine>,
}

impl Session {
    /// Creates a new `Session` and lays out its initial topology.
    ///
    /// # Arguments
    /// * `options` - Session tunables.
    /// * `trainer` - What fits the predictor when training starts.
    ///
    /// # Returns
    /// The session and the receiving end of its events.
    pub fn new(
        options: SessionOptions,
        trainer: Box<dyn Trainer>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();

        let config = ConfigManager::new(options.initial_config.clone());
        let topology = topology::resolve(&config.current(), None);
        let selector = match options.pinned_sample {
            Some(index) => SampleSelector::Pinned(index),
            None => SampleSelector::seeded(options.seed),
        };

        let mut session = Self {
            config,
            trainer,
            events,
            dataset: None,
            topology,
            predictor: None,
            layout: None,
            snapshot: None,
            simulator: ForwardSimulator::new(selector),
            debouncer: ViewportDebouncer::new(options.viewport, options.debounce),
            viewport: options.viewport,
            generation: 0,
            training: None,
            phase: SessionPhase::Idle,
            logs: Vec::new(),
            options,
        };

        session.rebuild();
        (session, rx)
    }

    pub fn config(&self) -> NetworkConfig {
        self.config.current()
    }

    /// Returns a receiver notified on every committed config.
    pub fn subscribe_config(&self) -> watch::Receiver<NetworkConfig> {
        self.config.subscribe()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn predictor(&self) -> Option<&Sequential> {
        self.predictor.as_ref()
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_deref()
    }

    pub fn snapshot(&self) -> Option<&ActivationSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_training(&self) -> bool {
        self.training.is_some()
    }

    pub fn logs(&self) -> &[LogLine] {
        &self.logs
    }

    /// Returns a sender that feeds the session's resize debouncer directly.
    pub fn viewport_sender(&self) -> watch::Sender<Viewport> {
        self.debouncer.sender()
    }

    /// Drives the session until `commands` closes or a `Shutdown` arrives.
    ///
    /// # Arguments
    /// * `commands` - The receiving end of the presentation side's commands.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!("session started");

        loop {
            let (epoch_changed, finished) = match self.training.as_mut() {
                Some(t) => (Some(t.epochs.changed()), Some(&mut t.handle)),
                None => (None, None),
            };

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                },

                Some(Ok(())) = OptionFuture::from(epoch_changed) => self.on_epoch(),

                Some(res) = OptionFuture::from(finished) => self.on_training_done(res),

                viewport = self.debouncer.settled() => self.apply_viewport(viewport),
            }
        }

        self.cancel_training();
        info!("session stopped");
    }

    /// Applies a single command.
    pub fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::UpdateConfig(update) => self.update_config(update),
            SessionCommand::ReplaceConfig(config) => self.replace_config(config),
            SessionCommand::LoadDataset(dataset) => self.load_dataset(dataset),
            SessionCommand::LoadCsv { name, text } => match dataset::load_csv(&name, &text) {
                Ok(dataset) => self.load_dataset(dataset),
                Err(e) => self.fail(e),
            },
            SessionCommand::Resize(viewport) => self.debouncer.push(viewport),
            SessionCommand::StartTraining => self.start_training(),
            SessionCommand::CancelTraining => self.cancel_training(),
            SessionCommand::RunForward => self.run_forward(),
            SessionCommand::AnimateBackward(magnitudes) => self.animate_backward(magnitudes),
            SessionCommand::Shutdown => self.cancel_training(),
        }
    }

    /// Commits a config change, rebuilding everything downstream when the
    /// resolved topology changes.
    pub fn update_config(&mut self, update: ConfigUpdate) {
        let affects_topology = update.affects_topology();

        match self.config.update(update) {
            Ok(config) => {
                self.emit(SessionEvent::ConfigChanged(config.clone()));
                if affects_topology {
                    self.refresh_topology(&config);
                }
            }
            Err(e) => self.fail(e),
        }
    }

    pub fn replace_config(&mut self, config: NetworkConfig) {
        match self.config.replace(config) {
            Ok(config) => {
                self.emit(SessionEvent::ConfigChanged(config.clone()));
                self.refresh_topology(&config);
            }
            Err(e) => self.fail(e),
        }
    }

    /// Replaces the dataset, applies its recommended shape and rebuilds.
    pub fn load_dataset(&mut self, dataset: Dataset) {
        self.invalidate();

        let config = self.config.apply_dataset_defaults(&dataset);
        let summary = format!("loaded '{}': {}", dataset.name(), dataset.summary());
        self.dataset = Some(Arc::new(dataset));

        self.push_log("INFO", summary);
        self.emit(SessionEvent::ConfigChanged(config));
        self.rebuild();
    }

    /// Starts training the live predictor, superseding any training in flight.
    pub fn start_training(&mut self) {
        let Some(dataset) = self.dataset.clone() else {
            return self.fail(VisErr::NotReady("load a dataset before training"));
        };
        let Some(predictor) = self.predictor.clone() else {
            return self.fail(VisErr::NotReady("no model has been built"));
        };

        self.cancel_training();

        let config = self.config.current();
        let (tx, epochs) = watch::channel(None);
        let job = TrainingJob {
            topology: self.topology.clone(),
            predictor,
            dataset,
            config: config.clone(),
            seed: self.options.seed.wrapping_add(self.generation),
        };

        let handle = self.trainer.spawn(
            job,
            Box::new(move |report: EpochReport| {
                tx.send_replace(Some(report));
            }),
        );

        self.training = Some(RunningTraining {
            generation: self.generation,
            last_epoch: 0,
            epochs,
            handle,
        });
        self.phase = SessionPhase::Training;
        self.push_log(
            "INFO",
            format!(
                "training started: {} epochs, {:?}, lr={}",
                config.epochs, config.optimizer, config.learning_rate
            ),
        );
    }

    /// Cancels the training in flight, if any. Its results are dropped.
    pub fn cancel_training(&mut self) {
        let Some(running) = self.training.take() else {
            return;
        };

        running.handle.cancel();
        warn!(generation = running.generation; "training cancelled");

        if self.phase == SessionPhase::Training {
            self.phase = SessionPhase::Idle;
        }
        self.emit(SessionEvent::TrainingCancelled {
            generation: running.generation,
        });
        self.push_log("WARN", "training cancelled".into());
    }

    /// Runs a forward pass through the live predictor and plans its animation.
    pub fn run_forward(&mut self) {
        let activation = self.config.current().activation;
        let res = self.simulator.run(
            self.predictor.as_ref().map(|p| p as &dyn Predictor),
            self.dataset.as_deref(),
            activation,
        );
        self.publish_activations(res, None);
    }

    pub fn animate_backward(&mut self, magnitudes: Option<Vec<Array1<f32>>>) {
        let trace = match magnitudes {
            Some(trace) => trace,
            None => match &self.snapshot {
                Some(snapshot) => snapshot.layers.clone(),
                None => return self.fail(VisErr::NotReady("no activations to animate")),
            },
        };

        match build_plan(&trace, &self.topology, Direction::Backward, &self.options.timing) {
            Ok(plan) => self.emit(SessionEvent::BackwardPlanned {
                generation: self.generation,
                plan,
            }),
            Err(e) => self.fail(e),
        }
    }

    /// Lays the topology out again for a settled viewport.
    pub fn apply_viewport(&mut self, viewport: Viewport) {
        debug!("viewport settled at {}x{}", viewport.width, viewport.height);
        self.viewport = viewport;
        self.relayout();
    }

    fn on_epoch(&mut self) {
        let Some(running) = &mut self.training else {
            return;
        };

        let generation = running.generation;
        let Some(report) = running.epochs.borrow_and_update().clone() else {
            return;
        };
        if report.epoch <= running.last_epoch {
            return;
        }
        running.last_epoch = report.epoch;

        if generation != self.generation {
            warn!(generation = generation; "dropping stale epoch report");
            return;
        }

        self.emit(SessionEvent::EpochCompleted {
            generation,
            epoch: report.epoch,
            metrics: report.metrics,
        });

        let activation = self.config.current().activation;
        let res = self
            .simulator
            .run(Some(&report.predictor), self.dataset.as_deref(), activation);

        match res {
            Err(e @ VisErr::NumericInstability { .. }) => self.abort_training(e),
            res => self.publish_activations(res, Some(report.epoch)),
        }
    }

    /// Ends the training in flight as failed. Its predictor is never applied.
    fn abort_training(&mut self, e: VisErr) {
        self.cancel_training();
        self.phase = SessionPhase::Error;
        self.fail(e);
    }

    fn on_training_done(&mut self, res: Result<Sequential>) {
        // The last report may land together with the result.
        self.on_epoch();

        let Some(running) = self.training.take() else {
            return;
        };

        if running.generation != self.generation {
            warn!(generation = running.generation; "dropping stale training result");
            return;
        }

        match res {
            Ok(predictor) => {
                let epochs = self.config.current().epochs;
                self.predictor = Some(predictor);
                self.phase = SessionPhase::Finished;
                self.push_log("INFO", format!("training finished after {epochs} epochs"));
                self.emit(SessionEvent::TrainingFinished {
                    generation: running.generation,
                    epochs,
                });
                self.run_forward();
            }
            Err(VisErr::Cancelled) => {
                self.phase = SessionPhase::Idle;
                self.emit(SessionEvent::TrainingCancelled {
                    generation: running.generation,
                });
            }
            Err(e) => {
                self.phase = SessionPhase::Error;
                self.fail(e);
            }
        }
    }

    fn publish_activations(&mut self, res: Result<ActivationSnapshot>, epoch: Option<usize>) {
        let planned = res.and_then(|snapshot| {
            let plan = build_plan(
                &snapshot.layers,
                &self.topology,
                Direction::Forward,
                &self.options.timing,
            )?;
            Ok((snapshot, plan))
        });

        match planned {
            Ok((snapshot, plan)) => {
                self.snapshot = Some(snapshot.clone());
                self.emit(SessionEvent::Activations {
                    generation: self.generation,
                    epoch,
                    snapshot,
                    plan,
                });
            }
            Err(e) => self.fail(e),
        }
    }

    fn refresh_topology(&mut self, config: &NetworkConfig) {
        let topology = topology::resolve(config, self.dataset.as_deref());
        if topology == self.topology && self.predictor.is_some() {
            return;
        }

        self.invalidate();
        self.rebuild();
    }

    /// Bumps the generation and cancels the training in flight.
    fn invalidate(&mut self) {
        self.generation += 1;
        self.cancel_training();
        self.snapshot = None;
        debug!(generation = self.generation; "session invalidated");
    }

    /// Recomputes topology, predictor and layout from the committed config.
    fn rebuild(&mut self) {
        self.topology = topology::resolve(&self.config.current(), self.dataset.as_deref());
        self.emit(SessionEvent::TopologyChanged(self.topology.clone()));

        let seed = self.options.seed.wrapping_add(self.generation);
        match Sequential::from_topology(&self.topology, seed) {
            Ok(predictor) => self.predictor = Some(predictor),
            Err(e) => {
                self.predictor = None;
                self.fail(e);
            }
        }

        self.relayout();
    }

    fn relayout(&mut self) {
        let Viewport { width, height } = self.viewport;

        match layout(&self.topology, width, height, &self.options.layout) {
            Ok(layout) => {
                self.layout = Some(layout.clone());
                self.emit(SessionEvent::LayoutChanged(layout));
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, e: VisErr) {
        let recoverable = e.is_recoverable();
        if recoverable {
            warn!("{e}");
        } else {
            error!("{e}");
        }

        self.push_log(if recoverable { "WARN" } else { "ERROR" }, e.to_string());
        self.emit(SessionEvent::Failed {
            message: e.to_string(),
            recoverable,
        });
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine, the session keeps its own state.
        let _ = self.events.send(event);
    }

    fn push_log(&mut self, level: &'static str, message: String) {
        self.emit(SessionEvent::Status(message.clone()));
        self.logs.push(LogLine { level, message });
        if self.logs.len() > MAX_LOGS {
            let drain = self.logs.len() - MAX_LOGS;
            self.logs.drain(0..drain);
        }
    }
}
