//! Single-job execution controller.
//!
//! The controller owns the calculator configuration and at most one job.
//! A submission synthesizes the program and installs the job in
//! `Compiling`. Compilation, dispatch and the wait for the backend happen
//! in a background task, so dropping the `submit` future never strands a
//! job:
//!
//! ```text
//!   submit() ──→ Compiling ──→ Submitted ──→ Running ──┬─→ Completed
//!      │         (background task from here on)        └─→ Failed
//!      └─ Busy / SyntaxError / BackendUnavailable (no job touched)
//! ```
//!
//! Progress is observable three ways: [`Controller::poll`], the watch
//! channel inside a [`JobHandle`], and the phase log.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::BackendClient;
use crate::circuit::CircuitProgram;
use crate::config::{BitWidth, CalcConfig};
use crate::decode::{AnswerSet, Decoded, decode};
use crate::error::{CalcError, CalcResult};
use crate::job::{Job, JobId, JobStatus, Phase, PhaseEntry};
use crate::result::{Counts, ExecutionResult};
use crate::sequence::{InputMode, Sequence, sequence};
use crate::synth::Synthesizer;

/// Handle to a submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    status: watch::Receiver<JobStatus>,
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Latest published status.
    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    /// Wait until the job reaches `Completed` or `Failed`.
    pub async fn wait(&mut self) -> JobStatus {
        let reached = self
            .status
            .wait_for(JobStatus::is_terminal)
            .await
            .map(|status| JobStatus::clone(&status));
        reached.unwrap_or_else(|_| self.status.borrow().clone())
    }
}

struct State {
    config: CalcConfig,
    synth: Synthesizer,
    job: Option<Job>,
    notify: Option<watch::Sender<JobStatus>>,
    next_id: u64,
}

impl State {
    fn is_busy(&self) -> bool {
        self.job
            .as_ref()
            .is_some_and(|job| job.status().is_pending())
    }

    fn next_job_id(&mut self) -> JobId {
        self.next_id += 1;
        JobId::new(format!("calc-{}", self.next_id))
    }

    fn current(&self, id: &JobId) -> Option<&Job> {
        self.job.as_ref().filter(|job| job.id() == id)
    }

    /// The current job, if it is `id` and still pending.
    fn pending_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.job
            .as_mut()
            .filter(|job| job.id() == id && job.status().is_pending())
    }

    /// Make `job` current, replacing any finished one.
    fn install(&mut self, job: Job) -> JobHandle {
        let (tx, rx) = watch::channel(job.status().clone());
        let handle = JobHandle {
            id: job.id().clone(),
            status: rx,
        };
        self.job = Some(job);
        self.notify = Some(tx);
        handle
    }

    fn publish(&self) {
        if let (Some(job), Some(tx)) = (&self.job, &self.notify) {
            tx.send_replace(job.status().clone());
        }
    }

    /// Fail the job if it is still pending. Returns whether it was.
    fn fail(&mut self, id: &JobId, error: CalcError) -> bool {
        let Some(job) = self.pending_mut(id) else {
            return false;
        };
        warn!(job = %id, error = %error, "computation failed");
        if let Err(e) = job.fail(error) {
            warn!(job = %id, error = %e, "could not record failure");
        }
        self.publish();
        true
    }

    /// Record what the backend delivered for `id`.
    fn settle(&mut self, id: &JobId, outcome: CalcResult<ExecutionResult>) {
        let Some(job) = self
            .pending_mut(id)
            .filter(|job| matches!(job.status(), JobStatus::Running))
        else {
            debug!(job = %id, "discarding result of an abandoned job");
            return;
        };
        let qubits = job.qubits();
        let decoded = outcome.and_then(|result| {
            let decoded = decode(&result.counts, qubits)?;
            Ok((result.counts, decoded))
        });
        let recorded = match decoded {
            Ok((counts, decoded)) => job.complete(counts, decoded),
            Err(error) => {
                warn!(job = %id, error = %error, "computation failed");
                job.fail(error.into_job_failure())
            }
        };
        if let Err(e) = recorded {
            warn!(job = %id, error = %e, "could not record outcome");
        }
        self.publish();
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Compile `program`, hand it to the backend and record the outcome.
///
/// Gives up quietly once the job is no longer the pending current job.
async fn execute<B: BackendClient + 'static>(
    backend: Arc<B>,
    state: Arc<Mutex<State>>,
    id: JobId,
    backend_id: String,
    program: CircuitProgram,
    seed: u64,
) {
    let compiled = match backend
        .compile(&program, &backend_id, program.shots(), seed)
        .await
    {
        Ok(compiled) => compiled,
        Err(error) => {
            lock(&state).fail(&id, error.into_job_failure());
            return;
        }
    };

    let outcome = {
        let mut guard = lock(&state);
        let Some(job) = guard
            .pending_mut(&id)
            .filter(|job| matches!(job.status(), JobStatus::Compiling))
        else {
            debug!(job = %id, "dropping compiled program of an abandoned job");
            return;
        };
        let description = format!("Submit {} shots to {backend_id}", compiled.shots);
        if let Err(e) = job.advance(JobStatus::Submitted, Phase::Run, description) {
            guard.fail(&id, e);
            return;
        }
        let outcome = Arc::clone(&backend).run_async(compiled);
        if let Err(e) = job.advance(JobStatus::Running, Phase::Run, "Run quantum circuit") {
            guard.fail(&id, e);
            return;
        }
        guard.publish();
        outcome
    };

    let result = outcome
        .await
        .unwrap_or_else(|_| Err(CalcError::Backend("backend dropped the job".into())));
    lock(&state).settle(&id, result);
}

/// Drives computations against a [`BackendClient`], one at a time.
pub struct Controller<B> {
    backend: Arc<B>,
    state: Arc<Mutex<State>>,
}

impl<B> Clone for Controller<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            state: Arc::clone(&self.state),
        }
    }
}

impl<B: BackendClient + 'static> Controller<B> {
    /// Create a controller. Fails if `config` holds an invalid bit width.
    pub fn new(backend: Arc<B>, config: CalcConfig) -> CalcResult<Self> {
        let synth = Synthesizer::new(config.bit_width()?)?;
        info!(
            backend = %config.backend_id,
            qubits = config.qubits,
            "calculator controller ready"
        );
        Ok(Self {
            backend,
            state: Arc::new(Mutex::new(State {
                config,
                synth,
                job: None,
                notify: None,
                next_id: 0,
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn config(&self) -> CalcConfig {
        self.lock().config.clone()
    }

    pub fn width(&self) -> BitWidth {
        self.lock().synth.width()
    }

    /// Backend ids offered by the client.
    pub fn list_backends(&self) -> Vec<String> {
        self.backend.list_backends()
    }

    /// Change the operand width. Rejected while a job is in flight.
    pub fn set_qubits(&self, qubits: u32) -> CalcResult<()> {
        let mut state = self.lock();
        if state.is_busy() {
            return Err(CalcError::Busy);
        }
        let width = state.synth.width().with_qubits(qubits)?;
        state.synth = Synthesizer::new(width)?;
        state.config.qubits = qubits;
        info!(qubits, "bit width changed");
        Ok(())
    }

    /// Select a backend. Rejected while a job is in flight.
    pub fn set_backend(&self, backend_id: &str) -> CalcResult<()> {
        if !self.list_backends().iter().any(|id| id == backend_id) {
            return Err(CalcError::Configuration(format!(
                "unknown backend '{backend_id}'"
            )));
        }
        let mut state = self.lock();
        if state.is_busy() {
            return Err(CalcError::Busy);
        }
        state.config = state.config.clone().with_backend(backend_id);
        info!(backend = backend_id, remote = state.config.remote, "backend changed");
        Ok(())
    }

    /// Sequence `text` at the current width.
    pub fn sequence(&self, text: &str, mode: InputMode) -> Sequence {
        sequence(text, mode, self.width())
    }

    pub fn is_busy(&self) -> bool {
        self.lock().is_busy()
    }

    /// Start computing `sequence`.
    ///
    /// Returns as soon as the job is installed, in `Compiling`, or already
    /// `Failed` if synthesis rejected it. `Busy`, `SyntaxError` and
    /// `BackendUnavailable` are returned without touching the current job.
    pub async fn submit(&self, sequence: &Sequence) -> CalcResult<JobHandle> {
        if sequence.is_empty() {
            return Err(CalcError::SyntaxError(
                "expression has no operator between two operands".into(),
            ));
        }
        let backend_id = {
            let state = self.lock();
            if state.is_busy() {
                return Err(CalcError::Busy);
            }
            state.config.backend_id.clone()
        };

        let status = self.backend.backend_status(&backend_id).await?;
        if !status.is_available {
            return Err(CalcError::BackendUnavailable(
                status.status_message.unwrap_or_else(|| backend_id.clone()),
            ));
        }

        let (handle, program, seed) = {
            let mut state = self.lock();
            if state.is_busy() {
                return Err(CalcError::Busy);
            }
            let id = state.next_job_id();
            let width = state.synth.width();
            let mut job = Job::new(id, &backend_id, width.qubits());
            job.advance(
                JobStatus::Compiling,
                Phase::Registers,
                format!("Initialize quantum registers ({} qubits)", width.layout().num_qubits()),
            )?;
            for (op, operand) in sequence.steps() {
                job.log(
                    Phase::InputState,
                    format!("Define input state ({}): {operand}", op.tag()),
                );
                job.log(
                    Phase::Circuit,
                    format!("Define quantum circuit ({})", op.tag()),
                );
            }
            let program = match state.synth.synthesize(sequence, state.config.base_shots) {
                Ok(program) => {
                    job.set_program(program.clone());
                    job.log(
                        Phase::Compile,
                        format!("Compile quantum circuit for {backend_id}"),
                    );
                    Some(program)
                }
                Err(error) => {
                    job.fail(error.into_job_failure())?;
                    None
                }
            };
            let handle = state.install(job);
            (handle, program, state.config.seed)
        };
        if let Some(program) = program {
            tokio::spawn(execute(
                Arc::clone(&self.backend),
                Arc::clone(&self.state),
                handle.id().clone(),
                backend_id,
                program,
                seed,
            ));
        }
        Ok(handle)
    }

    /// Sequence `text` and submit it.
    pub async fn compute(&self, text: &str, mode: InputMode) -> CalcResult<JobHandle> {
        let sequence = self.sequence(text, mode);
        self.submit(&sequence).await
    }

    /// Current status of the job behind `handle`.
    pub fn poll(&self, handle: &JobHandle) -> CalcResult<JobStatus> {
        self.lock()
            .current(handle.id())
            .map(|job| job.status().clone())
            .ok_or_else(|| CalcError::JobNotFound(handle.id().to_string()))
    }

    /// Submit and block until the job finishes or `timeout` elapses.
    ///
    /// The deadline covers the backend status query and compilation too.
    /// If it passes before a job exists the error names the backend. If it
    /// passes afterwards the job is marked failed and anything the backend
    /// delivers later is discarded.
    pub async fn run_and_wait(
        &self,
        sequence: &Sequence,
        timeout: Duration,
    ) -> CalcResult<Decoded> {
        let deadline = Instant::now() + timeout;
        let mut handle = match tokio::time::timeout_at(deadline, self.submit(sequence)).await {
            Ok(submitted) => submitted?,
            Err(_) => return Err(CalcError::Timeout(self.config().backend_id)),
        };
        if tokio::time::timeout_at(deadline, handle.wait()).await.is_err() {
            let id = handle.id();
            if lock(&self.state).fail(id, CalcError::Timeout(id.to_string())) {
                return Err(CalcError::Timeout(id.to_string()));
            }
        }
        self.outcome(handle.id())
    }

    fn outcome(&self, id: &JobId) -> CalcResult<Decoded> {
        let state = self.lock();
        let job = state
            .current(id)
            .ok_or_else(|| CalcError::JobNotFound(id.to_string()))?;
        match (job.decoded(), job.failure()) {
            (Some(decoded), _) => Ok(decoded.clone()),
            (None, Some(error)) => Err(error.clone()),
            (None, None) => Err(CalcError::Backend(format!(
                "job {id} ended without a result ({})",
                job.status()
            ))),
        }
    }

    /// Snapshot of the current job.
    pub fn job(&self) -> Option<Job> {
        self.lock().job.clone()
    }

    /// Status of the current job, `Idle` if there is none.
    pub fn status(&self) -> JobStatus {
        self.lock()
            .job
            .as_ref()
            .map_or(JobStatus::Idle, |job| job.status().clone())
    }

    /// One-line status for display.
    pub fn status_line(&self) -> String {
        let state = self.lock();
        let Some(job) = state.job.as_ref() else {
            return "Idle".into();
        };
        match (job.status(), job.decoded()) {
            (JobStatus::Completed, Some(decoded)) => decoded.status(),
            (JobStatus::Failed(message), _) => format!("FAIL: {message}"),
            (status, _) if status.is_pending() => {
                format!("Wait. Calculating on {}", job.backend_id())
            }
            (status, _) => status.to_string(),
        }
    }

    pub fn phase_log(&self) -> Vec<PhaseEntry> {
        self.lock()
            .job
            .as_ref()
            .map(|job| job.phase_log().to_vec())
            .unwrap_or_default()
    }

    /// Answers of the current job, if it completed.
    pub fn answer(&self) -> Option<AnswerSet> {
        self.decoded().map(|decoded| decoded.answers().clone())
    }

    pub fn decoded(&self) -> Option<Decoded> {
        self.lock().job.as_ref()?.decoded().cloned()
    }

    pub fn counts(&self) -> Option<Counts> {
        self.lock().job.as_ref()?.counts().cloned()
    }

    pub fn failure(&self) -> Option<CalcError> {
        self.lock().job.as_ref()?.failure().cloned()
    }
}
