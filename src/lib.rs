//! Quantum arithmetic calculator core.
//!
//! Turns an arithmetic expression over small unsigned integers (or fully
//! superposed operands) into a reversible circuit, runs it on a backend and
//! reports the distinct answers ranked by how often they were measured.
//!
//! # Pipeline
//!
//! ```text
//!   "3+2-1" ──→ sequence() ──→ Synthesizer ──→ BackendClient ──→ decode()
//!               Sequence       CircuitProgram   compile / run     Decoded
//! ```
//!
//! - [`sequence()`] tokenizes an expression into operands and operators.
//!   Malformed input yields an empty [`Sequence`], never an error.
//! - [`Synthesizer`] builds a Cuccaro ripple-carry adder once per bit
//!   width, derives the subtractor by reversal and chains one of them per
//!   operator into a single [`CircuitProgram`].
//! - [`BackendClient`] is the seam to whatever executes the program.
//!   [`LocalSimulator`] is the bundled implementation. It [`route()`]s
//!   programs onto constrained coupling maps with SWAPs.
//! - [`Controller`] runs at most one job at a time and keeps its
//!   [`JobStatus`] and phase log.
//! - [`decode()`] maps the measured histogram to an [`AnswerSet`]; a set
//!   carry-out reads as `OR` (out of range).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use quantum_calc::{CalcConfig, Controller, InputMode, LocalSimulator};
//!
//! # async fn demo() -> quantum_calc::CalcResult<()> {
//! let controller = Controller::new(Arc::new(LocalSimulator::new()), CalcConfig::default())?;
//! let mut handle = controller.compute("3+2", InputMode::Decimal).await?;
//! handle.wait().await;
//! assert_eq!(controller.status_line(), "Completed: 1 answer");
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod capability;
pub mod circuit;
pub mod config;
pub mod controller;
pub mod decode;
pub mod error;
pub mod job;
pub mod result;
pub mod route;
pub mod sequence;
pub mod sim;
pub mod synth;

pub use backend::{BackendClient, BackendStatus};
pub use capability::{Capabilities, GateSet, Topology, TopologyKind};
pub use circuit::{
    Circuit, CircuitBuilder, CircuitProgram, CompiledProgram, Gate, Instruction, QubitRef,
    Register,
};
pub use config::{BitWidth, CalcConfig, RegisterLayout};
pub use controller::{Controller, JobHandle};
pub use decode::{Answer, AnswerSet, Decoded, DecodedRow, OVERFLOW_SENTINEL, decode};
pub use error::{CalcError, CalcResult};
pub use job::{Job, JobId, JobStatus, Phase, PhaseEntry};
pub use result::{Counts, ExecutionResult};
pub use route::{Layout, route};
pub use sequence::{Bit, InputMode, Operand, Operator, Sequence, sequence};
pub use sim::{BasisState, LocalSimulator};
pub use synth::Synthesizer;
