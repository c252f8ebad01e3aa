//! Job lifecycle types.
//!
//! The job state machine:
//!
//! ```text
//!   Idle ──→ Compiling ──→ Submitted ──→ Running ──→ Completed
//!               │              │            │
//!               └──────────────┴────────────┴──→ Failed(reason)
//! ```
//!
//! **Invariants:**
//! - Transitions are monotonic: a job never moves backward.
//! - Terminal states (`Completed`, `Failed`) are permanent.
//! - Counts and decoded answers exist if and only if the job is `Completed`.
//! - The phase log only grows.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::circuit::CircuitProgram;
use crate::decode::Decoded;
use crate::error::{CalcError, CalcResult};
use crate::result::Counts;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Created, nothing done yet.
    Idle,
    /// Synthesizing and compiling the program.
    Compiling,
    /// Compiled and handed to the backend.
    Submitted,
    /// Executing on the backend.
    Running,
    /// Finished with a decoded answer.
    Completed,
    /// Failed with an error message.
    Failed(String),
}

impl JobStatus {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed(_))
    }

    /// Check if the job holds the controller (compiling, submitted or running).
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            JobStatus::Compiling | JobStatus::Submitted | JobStatus::Running
        )
    }

    /// Check if the job completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Idle => 0,
            JobStatus::Compiling => 1,
            JobStatus::Submitted => 2,
            JobStatus::Running => 3,
            JobStatus::Completed | JobStatus::Failed(_) => 4,
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: &JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStatus::Failed(_) => true,
            JobStatus::Completed => matches!(self, JobStatus::Running),
            _ => next.rank() == self.rank() + 1,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Idle => write!(f, "Idle"),
            JobStatus::Compiling => write!(f, "Compiling"),
            JobStatus::Submitted => write!(f, "Submitted"),
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Failed(msg) => write!(f, "Failed: {msg}"),
        }
    }
}

/// Progress milestones, numbered as shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Initialized,
    Registers,
    InputState,
    Circuit,
    Compile,
    Run,
    Finished,
}

impl Phase {
    pub fn index(self) -> u32 {
        match self {
            Phase::Initialized => 0,
            Phase::Registers => 1,
            Phase::InputState => 2,
            Phase::Circuit => 3,
            Phase::Compile => 4,
            Phase::Run => 5,
            Phase::Finished => 6,
        }
    }
}

/// One phase-log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseEntry {
    pub index: u32,
    pub description: String,
    pub at: DateTime<Utc>,
}

impl fmt::Display for PhaseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Phase {}: {}", self.index, self.description)
    }
}

/// A single computation as tracked by the controller.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    backend_id: String,
    qubits: u32,
    shots: u32,
    program: Option<CircuitProgram>,
    status: JobStatus,
    phase_log: Vec<PhaseEntry>,
    counts: Option<Counts>,
    decoded: Option<Decoded>,
    failure: Option<CalcError>,
    created_at: DateTime<Utc>,
}

impl Job {
    /// New job in `Idle`, with the initial phase logged.
    pub(crate) fn new(id: JobId, backend_id: impl Into<String>, qubits: u32) -> Self {
        let mut job = Self {
            id,
            backend_id: backend_id.into(),
            qubits,
            shots: 0,
            program: None,
            status: JobStatus::Idle,
            phase_log: Vec::new(),
            counts: None,
            decoded: None,
            failure: None,
            created_at: Utc::now(),
        };
        job.log(Phase::Initialized, "initialized.");
        job
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    /// Operand width the job was built for.
    pub fn qubits(&self) -> u32 {
        self.qubits
    }

    pub fn shots(&self) -> u32 {
        self.shots
    }

    pub fn program(&self) -> Option<&CircuitProgram> {
        self.program.as_ref()
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn phase_log(&self) -> &[PhaseEntry] {
        &self.phase_log
    }

    /// Raw histogram, present only when completed.
    pub fn counts(&self) -> Option<&Counts> {
        self.counts.as_ref()
    }

    /// Decoded answers, present only when completed.
    pub fn decoded(&self) -> Option<&Decoded> {
        self.decoded.as_ref()
    }

    /// Failure cause, present only when failed.
    pub fn failure(&self) -> Option<&CalcError> {
        self.failure.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn set_program(&mut self, program: CircuitProgram) {
        self.shots = program.shots();
        self.program = Some(program);
    }

    /// Append to the phase log.
    pub(crate) fn log(&mut self, phase: Phase, description: impl Into<String>) {
        let entry = PhaseEntry {
            index: phase.index(),
            description: description.into(),
            at: Utc::now(),
        };
        info!(job = %self.id, phase = entry.index, "{}", entry.description);
        self.phase_log.push(entry);
    }

    /// Move to `next` and log the phase.
    pub(crate) fn advance(
        &mut self,
        next: JobStatus,
        phase: Phase,
        description: impl Into<String>,
    ) -> CalcResult<()> {
        if !self.status.can_transition_to(&next) {
            return Err(CalcError::Backend(format!(
                "job {}: illegal transition {} -> {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.log(phase, description);
        Ok(())
    }

    /// Record a successful result.
    pub(crate) fn complete(&mut self, counts: Counts, decoded: Decoded) -> CalcResult<()> {
        let description = format!("All process done. {}", decoded.status());
        self.advance(JobStatus::Completed, Phase::Finished, description)?;
        self.counts = Some(counts);
        self.decoded = Some(decoded);
        Ok(())
    }

    /// Record a failure. Any partial result is discarded.
    pub(crate) fn fail(&mut self, error: CalcError) -> CalcResult<()> {
        let message = error.to_string();
        self.advance(
            JobStatus::Failed(message.clone()),
            Phase::Finished,
            format!("FAIL: {message}"),
        )?;
        self.counts = None;
        self.decoded = None;
        self.failure = Some(error);
        Ok(())
    }
}
