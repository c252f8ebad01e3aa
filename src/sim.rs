//! Local simulator backend.
//!
//! Calculator programs only use permutation gates (`x`, `cx`, `ccx`),
//! `reset`, `measure` and Hadamards on qubits whose value is the same in
//! every branch. Under that restriction each shot can be simulated as a
//! single computational basis state: a Hadamard draws a fair coin, and
//! everything else is classical bit logic. `compile()` enforces the
//! restriction, so sampling is exact for every program it accepts.
//!
//! Programs for a constrained coupling map are routed with SWAPs before the
//! capability check, so the adder runs on `local_linear` too.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument};

use crate::backend::{BackendClient, BackendStatus};
use crate::capability::{Capabilities, Topology};
use crate::circuit::{CircuitProgram, CompiledProgram, Instruction};
use crate::error::{CalcError, CalcResult};
use crate::result::{Counts, ExecutionResult};
use crate::route::route;

/// Qubits offered by the bundled devices.
const DEFAULT_MAX_QUBITS: u32 = 24;

/// Runs with more shots than this sample on the blocking pool.
const BLOCKING_SHOTS: u32 = 4096;

/// Single-shot basis-state register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasisState {
    qubits: Vec<bool>,
    clbits: Vec<bool>,
}

impl BasisState {
    /// All qubits and classical bits zero.
    pub fn new(num_qubits: u32, num_clbits: u32) -> Self {
        Self {
            qubits: vec![false; num_qubits as usize],
            clbits: vec![false; num_clbits as usize],
        }
    }

    /// Start from explicit qubit values.
    pub fn from_qubits(qubits: Vec<bool>, num_clbits: u32) -> Self {
        Self {
            qubits,
            clbits: vec![false; num_clbits as usize],
        }
    }

    pub fn qubits(&self) -> &[bool] {
        &self.qubits
    }

    /// Classical register as a bitstring, rightmost character = bit 0.
    pub fn bitstring(&self) -> String {
        self.clbits
            .iter()
            .rev()
            .map(|&b| if b { '1' } else { '0' })
            .collect()
    }

    fn qubit(&self, q: u32) -> CalcResult<usize> {
        let i = q as usize;
        if i >= self.qubits.len() {
            return Err(CalcError::RegisterSizeError(format!(
                "qubit q[{q}] outside register of {} qubits",
                self.qubits.len()
            )));
        }
        Ok(i)
    }

    fn operands<const N: usize>(&self, inst: &Instruction) -> CalcResult<[usize; N]> {
        if inst.qubits.len() != N {
            return Err(CalcError::CircuitError(format!(
                "'{}' expects {N} qubits, got {}",
                inst.name,
                inst.qubits.len()
            )));
        }
        let mut out = [0; N];
        for (slot, &q) in out.iter_mut().zip(&inst.qubits) {
            *slot = self.qubit(q)?;
        }
        Ok(out)
    }

    /// Apply one instruction. Hadamards draw from `rng`.
    pub fn apply<R: Rng>(&mut self, inst: &Instruction, rng: &mut R) -> CalcResult<()> {
        match inst.name.as_str() {
            "x" => {
                let [t] = self.operands(inst)?;
                self.qubits[t] ^= true;
            }
            "h" => {
                let [t] = self.operands(inst)?;
                self.qubits[t] = rng.gen_bool(0.5);
            }
            "cx" => {
                let [c, t] = self.operands(inst)?;
                let control = self.qubits[c];
                self.qubits[t] ^= control;
            }
            "ccx" => {
                let [c1, c2, t] = self.operands(inst)?;
                let control = self.qubits[c1] && self.qubits[c2];
                self.qubits[t] ^= control;
            }
            "reset" => {
                let [t] = self.operands(inst)?;
                self.qubits[t] = false;
            }
            "barrier" => {}
            "measure" => {
                let [q] = self.operands(inst)?;
                let c = inst.clbit.ok_or_else(|| {
                    CalcError::CircuitError("measure without classical bit".into())
                })? as usize;
                let slot = self.clbits.get_mut(c).ok_or_else(|| {
                    CalcError::RegisterSizeError(format!("classical bit ans[{c}] out of range"))
                })?;
                *slot = self.qubits[q];
            }
            other => {
                return Err(CalcError::CircuitError(format!(
                    "simulator cannot execute '{other}'"
                )));
            }
        }
        Ok(())
    }
}

/// Reject Hadamards on qubits whose value may differ between branches.
///
/// A qubit is definite until it is the target of `h`, or the target of a
/// controlled gate with an indefinite control. `reset` makes it definite again.
fn check_sampling_rules(program: &CompiledProgram) -> CalcResult<()> {
    let mut definite = vec![true; program.num_qubits as usize];
    for inst in &program.instructions {
        let known = |q: &u32| definite.get(*q as usize).copied().unwrap_or(false);
        let (target, value) = match (inst.name.as_str(), inst.qubits.as_slice()) {
            ("h", [t]) => {
                if !known(t) {
                    return Err(CalcError::CircuitError(format!(
                        "h on q[{t}] after it left a basis state is not supported"
                    )));
                }
                (*t, false)
            }
            ("reset", [t]) => (*t, true),
            ("cx", [c, t]) => (*t, known(t) && known(c)),
            ("ccx", [c1, c2, t]) => (*t, known(t) && known(c1) && known(c2)),
            _ => continue,
        };
        if let Some(slot) = definite.get_mut(target as usize) {
            *slot = value;
        }
    }
    Ok(())
}

/// In-process simulator implementing [`BackendClient`].
///
/// Offers `local_simulator` (all-to-all) and `local_linear` (linear
/// coupling map) by default.
pub struct LocalSimulator {
    devices: Vec<Capabilities>,
    available: AtomicBool,
    latency: Option<Duration>,
}

impl LocalSimulator {
    /// Simulator with the default devices.
    pub fn new() -> Self {
        Self {
            devices: vec![
                Capabilities::simulator("local_simulator", DEFAULT_MAX_QUBITS),
                Capabilities::simulator("local_linear", DEFAULT_MAX_QUBITS)
                    .with_topology(Topology::linear(DEFAULT_MAX_QUBITS)),
            ],
            available: AtomicBool::new(true),
            latency: None,
        }
    }

    /// Simulator exposing exactly `devices`.
    pub fn with_devices(devices: Vec<Capabilities>) -> Self {
        Self {
            devices,
            ..Self::new()
        }
    }

    /// Delay every run by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Take all devices on- or offline.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Capabilities of `backend_id`.
    pub fn device(&self, backend_id: &str) -> CalcResult<&Capabilities> {
        self.devices
            .iter()
            .find(|d| d.name == backend_id)
            .ok_or_else(|| CalcError::BackendUnavailable(format!("unknown backend '{backend_id}'")))
    }
}

/// Sample `compiled.shots` shots, seeded by `compiled.seed`.
fn sample(compiled: &CompiledProgram) -> CalcResult<Counts> {
    let mut rng = StdRng::seed_from_u64(compiled.seed);
    let mut counts = Counts::new();
    for _ in 0..compiled.shots {
        let mut state = BasisState::new(compiled.num_qubits, compiled.num_clbits);
        for inst in &compiled.instructions {
            state.apply(inst, &mut rng)?;
        }
        counts.insert(state.bitstring(), 1);
    }
    Ok(counts)
}

impl Default for LocalSimulator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendClient for LocalSimulator {
    fn list_backends(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.name.clone()).collect()
    }

    async fn backend_status(&self, backend_id: &str) -> CalcResult<BackendStatus> {
        let device = self.device(backend_id)?;
        let status = if self.available.load(Ordering::SeqCst) {
            BackendStatus::always_available()
        } else {
            BackendStatus::unavailable("simulator offline")
        };
        Ok(status.with_coupling_map(device.topology.coupling_map()))
    }

    #[instrument(skip(self, program))]
    async fn compile(
        &self,
        program: &CircuitProgram,
        backend_id: &str,
        shots: u32,
        seed: u64,
    ) -> CalcResult<CompiledProgram> {
        let device = self.device(backend_id)?;
        let lowered = program.lower(backend_id, shots, seed)?;
        device.check_size(lowered.num_qubits)?;
        let compiled = route(&lowered, &device.topology)?;
        device.check(&compiled)?;
        check_sampling_rules(&compiled)?;
        debug!(
            "Compiled {} instructions on {} qubits",
            compiled.instructions.len(),
            compiled.num_qubits
        );
        Ok(compiled)
    }

    #[instrument(skip(self, compiled), fields(backend = %compiled.backend_id, shots = compiled.shots))]
    async fn run(&self, compiled: &CompiledProgram) -> CalcResult<ExecutionResult> {
        let device = self.device(&compiled.backend_id)?;
        if !self.available.load(Ordering::SeqCst) {
            return Err(CalcError::BackendUnavailable(device.name.clone()));
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let start = Instant::now();
        let counts = if compiled.shots > BLOCKING_SHOTS {
            let owned = compiled.clone();
            tokio::task::spawn_blocking(move || sample(&owned))
                .await
                .map_err(|e| CalcError::Backend(format!("sampling task failed: {e}")))??
        } else {
            sample(compiled)?
        };
        let elapsed = start.elapsed();
        debug!("Simulation completed in {:?}", elapsed);

        Ok(ExecutionResult::new(counts, compiled.shots)
            .with_execution_time(elapsed.as_millis() as u64)
            .with_metadata(serde_json::json!({
                "backend": compiled.backend_id,
                "seed": compiled.seed,
            })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BitWidth;
    use crate::sequence::{InputMode, sequence};
    use crate::synth::Synthesizer;

    fn program(text: &str, qubits: u32) -> CircuitProgram {
        let width = BitWidth::new(qubits, 1, 8).unwrap();
        let synth = Synthesizer::new(width).unwrap();
        synth
            .synthesize(&sequence(text, InputMode::Decimal, width), 2)
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_and_status() {
        let sim = LocalSimulator::new();
        assert_eq!(sim.list_backends(), vec!["local_simulator", "local_linear"]);

        let status = sim.backend_status("local_simulator").await.unwrap();
        assert!(status.is_available);
        assert!(status.coupling_map.is_none());

        let status = sim.backend_status("local_linear").await.unwrap();
        assert!(status.coupling_map.is_some());

        sim.set_available(false);
        assert!(!sim.backend_status("local_simulator").await.unwrap().is_available);
        assert!(sim.backend_status("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_runs_addition() {
        let sim = LocalSimulator::new();
        let compiled = sim
            .compile(&program("3+2", 3), "local_simulator", 2, 1)
            .await
            .unwrap();
        let result = sim.run(&compiled).await.unwrap();
        assert_eq!(result.shots, 2);
        assert_eq!(result.counts.get("0101"), 2);
        assert_eq!(result.metadata["backend"], "local_simulator");
    }

    #[tokio::test]
    async fn test_compile_routes_linear_device() {
        let sim = LocalSimulator::new();
        let compiled = sim
            .compile(&program("1+1", 3), "local_linear", 2, 1)
            .await
            .unwrap();
        let direct = sim
            .compile(&program("1+1", 3), "local_simulator", 2, 1)
            .await
            .unwrap();
        assert!(compiled.instructions.len() > direct.instructions.len());
        let topology = Topology::linear(DEFAULT_MAX_QUBITS);
        assert!(
            compiled
                .instructions
                .iter()
                .all(|i| i.name == "barrier" || topology.spans(&i.qubits))
        );
        let result = sim.run(&compiled).await.unwrap();
        assert_eq!(result.counts.get("0010"), 2);
    }

    #[tokio::test]
    async fn test_compile_rejects_size_and_broken_coupling() {
        let split = Capabilities::simulator("split", 8)
            .with_topology(Topology::custom(vec![(0, 1), (1, 2), (3, 4)]));
        let sim = LocalSimulator::with_devices(vec![split]);
        let err = sim
            .compile(&program("1+1", 3), "split", 2, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CalcError::CircuitError(_)));

        let small = LocalSimulator::with_devices(vec![Capabilities::simulator("tiny", 5)]);
        let err = small
            .compile(&program("1+1", 3), "tiny", 2, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CalcError::RegisterSizeError(_)));
    }

    #[tokio::test]
    async fn test_large_shot_counts_sample_off_the_runtime() {
        let sim = LocalSimulator::new();
        let compiled = sim
            .compile(&program("H+1", 2), "local_linear", BLOCKING_SHOTS + 1, 3)
            .await
            .unwrap();
        let result = sim.run(&compiled).await.unwrap();
        assert_eq!(result.counts.total_shots(), u64::from(BLOCKING_SHOTS + 1));
        assert_eq!(result.counts.len(), 4);
        assert_eq!(result.counts, sample(&compiled).unwrap());
    }

    #[test]
    fn test_sampling_rules() {
        let mut compiled = program("1+1", 2).lower("local_simulator", 2, 1).unwrap();
        assert!(check_sampling_rules(&compiled).is_ok());

        // A second h on qa[0] would act on a superposed qubit.
        compiled.instructions.push(Instruction {
            name: "h".into(),
            qubits: vec![1],
            clbit: None,
        });
        compiled.instructions.push(Instruction {
            name: "h".into(),
            qubits: vec![1],
            clbit: None,
        });
        assert!(check_sampling_rules(&compiled).is_err());
    }

    #[test]
    fn test_basis_state_gates() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = BasisState::new(3, 2);
        let inst = |name: &str, qubits: &[u32], clbit: Option<u32>| Instruction {
            name: name.into(),
            qubits: qubits.to_vec(),
            clbit,
        };
        state.apply(&inst("x", &[0], None), &mut rng).unwrap();
        state.apply(&inst("x", &[1], None), &mut rng).unwrap();
        state.apply(&inst("ccx", &[0, 1, 2], None), &mut rng).unwrap();
        assert_eq!(state.qubits(), &[true, true, true]);
        state.apply(&inst("reset", &[1], None), &mut rng).unwrap();
        state.apply(&inst("measure", &[2], Some(0)), &mut rng).unwrap();
        state.apply(&inst("measure", &[1], Some(1)), &mut rng).unwrap();
        assert_eq!(state.bitstring(), "01");
        assert!(state.apply(&inst("rz", &[0], None), &mut rng).is_err());
        assert!(state.apply(&inst("cx", &[0], None), &mut rng).is_err());
        assert!(state.apply(&inst("x", &[9], None), &mut rng).is_err());
    }
}
