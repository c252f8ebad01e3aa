//! Backend client trait and status types.
//!
//! The [`BackendClient`] trait is everything the calculator needs from an
//! execution backend:
//!
//! ```text
//!   list_backends() ──→ backend_status() ──→ compile() ──→ run() / run_async()
//!      (sync)               (async)           (async)         (async)
//! ```
//!
//! ## Method table
//!
//! | Method | Kind | Required | Returns |
//! |--------|------|----------|---------|
//! | `list_backends()` | sync | yes | `Vec<String>` |
//! | `backend_status()` | async | yes | `CalcResult<BackendStatus>` |
//! | `compile()` | async | yes | `CalcResult<CompiledProgram>` |
//! | `run()` | async | yes | `CalcResult<ExecutionResult>` |
//! | `run_with_timeout()` | async | provided | `CalcResult<ExecutionResult>` |
//! | `run_async()` | sync | provided | `oneshot::Receiver<CalcResult<ExecutionResult>>` |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::circuit::{CircuitProgram, CompiledProgram};
use crate::error::{CalcError, CalcResult};
use crate::result::ExecutionResult;

/// Execution backend used by the calculator.
///
/// # Contract
///
/// - `compile()` MUST fail with `RegisterSizeError` when the program needs
///   more qubits than the backend has, and with `CircuitError` for any other
///   structural problem.
/// - `run()` MUST only be given programs returned by `compile()` on the same
///   client.
/// - `run_async()` fulfills its channel exactly once.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Backend ids this client can execute on, in display order.
    fn list_backends(&self) -> Vec<String>;

    /// Availability and coupling constraints of one backend.
    async fn backend_status(&self, backend_id: &str) -> CalcResult<BackendStatus>;

    /// Compile `program` for `backend_id`.
    async fn compile(
        &self,
        program: &CircuitProgram,
        backend_id: &str,
        shots: u32,
        seed: u64,
    ) -> CalcResult<CompiledProgram>;

    /// Execute a compiled program and return its measurement counts.
    async fn run(&self, compiled: &CompiledProgram) -> CalcResult<ExecutionResult>;

    /// Execute with a deadline.
    ///
    /// On timeout the backend call is abandoned, not cancelled remotely.
    async fn run_with_timeout(
        &self,
        compiled: &CompiledProgram,
        timeout: Duration,
    ) -> CalcResult<ExecutionResult> {
        tokio::time::timeout(timeout, self.run(compiled))
            .await
            .map_err(|_| CalcError::Timeout(compiled.backend_id.clone()))?
    }

    /// Execute in the background; the receiver resolves on completion.
    ///
    /// Must be called from within a tokio runtime.
    fn run_async(
        self: Arc<Self>,
        compiled: CompiledProgram,
    ) -> oneshot::Receiver<CalcResult<ExecutionResult>>
    where
        Self: Sized + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = self.run(&compiled).await;
            // The receiver may have given up; nothing to deliver to.
            let _ = tx.send(outcome);
        });
        rx
    }
}

/// Backend availability and constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendStatus {
    /// Whether the backend is currently accepting jobs.
    pub is_available: bool,
    /// Number of jobs currently in queue (if known).
    pub queue_depth: Option<u32>,
    /// Human-readable status message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Coupling map, if the backend constrains connectivity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupling_map: Option<Vec<(u32, u32)>>,
}

impl BackendStatus {
    /// Status of a backend that is always available.
    ///
    /// Typical for simulators, with an empty queue.
    pub fn always_available() -> Self {
        Self {
            is_available: true,
            queue_depth: Some(0),
            status_message: None,
            coupling_map: None,
        }
    }

    /// Status of an offline backend.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            is_available: false,
            queue_depth: None,
            status_message: Some(reason.into()),
            coupling_map: None,
        }
    }

    /// Attach a coupling map.
    pub fn with_coupling_map(mut self, coupling_map: Option<Vec<(u32, u32)>>) -> Self {
        self.coupling_map = coupling_map;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Counts;

    struct SlowBackend {
        delay: Duration,
    }

    #[async_trait]
    impl BackendClient for SlowBackend {
        fn list_backends(&self) -> Vec<String> {
            vec!["slow".into()]
        }

        async fn backend_status(&self, _backend_id: &str) -> CalcResult<BackendStatus> {
            Ok(BackendStatus::always_available())
        }

        async fn compile(
            &self,
            program: &CircuitProgram,
            backend_id: &str,
            shots: u32,
            seed: u64,
        ) -> CalcResult<CompiledProgram> {
            program.lower(backend_id, shots, seed)
        }

        async fn run(&self, compiled: &CompiledProgram) -> CalcResult<ExecutionResult> {
            tokio::time::sleep(self.delay).await;
            Ok(ExecutionResult::new(
                Counts::from_pairs([("0101", u64::from(compiled.shots))]),
                compiled.shots,
            ))
        }
    }

    fn compiled() -> CompiledProgram {
        CompiledProgram {
            backend_id: "slow".into(),
            num_qubits: 8,
            num_clbits: 4,
            shots: 2,
            seed: 1,
            instructions: vec![],
        }
    }

    #[test]
    fn test_backend_status_constructors() {
        let status = BackendStatus::always_available();
        assert!(status.is_available);
        assert_eq!(status.queue_depth, Some(0));

        let status = BackendStatus::unavailable("maintenance")
            .with_coupling_map(Some(vec![(0, 1)]));
        assert!(!status.is_available);
        assert_eq!(status.status_message, Some("maintenance".to_string()));
        assert_eq!(status.coupling_map, Some(vec![(0, 1)]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_timeout_expires() {
        let backend = SlowBackend {
            delay: Duration::from_secs(10),
        };
        let err = backend
            .run_with_timeout(&compiled(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, CalcError::Timeout("slow".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_async_delivers_once() {
        let backend = Arc::new(SlowBackend {
            delay: Duration::from_millis(50),
        });
        let rx = backend.run_async(compiled());
        let result = rx.await.unwrap().unwrap();
        assert_eq!(result.counts.get("0101"), 2);
    }
}
