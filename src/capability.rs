//! Backend capability profiles.
//!
//! A [`Capabilities`] value describes what a backend accepts: qubit count,
//! supported gates, coupling topology and shot limits. Backends use it to
//! reject programs at compile time with [`CalcError::RegisterSizeError`]
//! or [`CalcError::CircuitError`].
//!
//! All edges in [`Topology`] are bidirectional: if `(a, b)` is present,
//! both `a → b` and `b → a` are valid interactions. A multi-qubit gate is
//! accepted when its qubits form a connected piece of the coupling graph,
//! e.g. a Toffoli on three neighbouring qubits of a line.

use serde::{Deserialize, Serialize};

use crate::circuit::{CompiledProgram, Instruction};
use crate::error::{CalcError, CalcResult};

/// Non-gate operations every backend accepts.
const DIRECTIVES: [&str; 3] = ["reset", "barrier", "measure"];

/// Hardware capabilities of a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    /// Backend identifier.
    pub name: String,
    /// Number of qubits available.
    pub num_qubits: u32,
    /// Supported gate set (OpenQASM 3 naming convention).
    pub gate_set: GateSet,
    /// Qubit coupling topology. All edges are bidirectional.
    pub topology: Topology,
    /// Maximum number of shots per job.
    pub max_shots: u32,
    /// Whether this is a simulator.
    pub is_simulator: bool,
}

impl Capabilities {
    /// Fully connected simulator.
    pub fn simulator(name: impl Into<String>, num_qubits: u32) -> Self {
        Self {
            name: name.into(),
            num_qubits,
            gate_set: GateSet::reversible(),
            topology: Topology::full(num_qubits),
            max_shots: 100_000,
            is_simulator: true,
        }
    }

    /// Override the topology.
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Fail with `RegisterSizeError` when `num_qubits` does not fit.
    pub fn check_size(&self, num_qubits: u32) -> CalcResult<()> {
        if num_qubits > self.num_qubits {
            return Err(CalcError::RegisterSizeError(format!(
                "program needs {} qubits, backend '{}' has {}",
                num_qubits, self.name, self.num_qubits
            )));
        }
        Ok(())
    }

    /// Check a compiled program against these capabilities.
    pub fn check(&self, program: &CompiledProgram) -> CalcResult<()> {
        self.check_size(program.num_qubits)?;
        if program.shots == 0 || program.shots > self.max_shots {
            return Err(CalcError::CircuitError(format!(
                "shots must be 1..={}, got {}",
                self.max_shots, program.shots
            )));
        }
        for inst in &program.instructions {
            if !DIRECTIVES.contains(&inst.name.as_str()) && !self.gate_set.contains(&inst.name) {
                return Err(CalcError::CircuitError(format!(
                    "unsupported gate '{}' on backend '{}'",
                    inst.name, self.name
                )));
            }
            self.topology.check(inst)?;
        }
        Ok(())
    }
}

/// Gate set supported by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSet {
    /// Single-qubit gates supported.
    pub single_qubit: Vec<String>,
    /// Two-qubit gates supported.
    pub two_qubit: Vec<String>,
    /// Three-qubit gates supported.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub three_qubit: Vec<String>,
}

impl GateSet {
    /// Gates needed by the ripple-carry calculator.
    pub fn reversible() -> Self {
        Self {
            single_qubit: vec!["x".into(), "h".into()],
            two_qubit: vec!["cx".into()],
            three_qubit: vec!["ccx".into()],
        }
    }

    /// Check if a gate is supported.
    pub fn contains(&self, gate: &str) -> bool {
        self.single_qubit.iter().any(|g| g == gate)
            || self.two_qubit.iter().any(|g| g == gate)
            || self.three_qubit.iter().any(|g| g == gate)
    }
}

/// Qubit coupling topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    /// Kind of topology.
    pub kind: TopologyKind,
    /// Coupling edges. Bidirectional.
    pub edges: Vec<(u32, u32)>,
}

impl Topology {
    /// Linear chain `0 - 1 - ... - n-1`.
    pub fn linear(n: u32) -> Self {
        let edges: Vec<_> = (0..n.saturating_sub(1)).map(|i| (i, i + 1)).collect();
        Self {
            kind: TopologyKind::Linear,
            edges,
        }
    }

    /// All-to-all connectivity.
    pub fn full(n: u32) -> Self {
        let mut edges = vec![];
        for i in 0..n {
            for j in (i + 1)..n {
                edges.push((i, j));
            }
        }
        Self {
            kind: TopologyKind::FullyConnected,
            edges,
        }
    }

    /// Topology from an explicit coupling map.
    pub fn custom(edges: Vec<(u32, u32)>) -> Self {
        Self {
            kind: TopologyKind::Custom,
            edges,
        }
    }

    /// Check if two qubits are connected.
    pub fn is_connected(&self, q1: u32, q2: u32) -> bool {
        self.kind == TopologyKind::FullyConnected
            || self
                .edges
                .iter()
                .any(|&(a, b)| (a == q1 && b == q2) || (a == q2 && b == q1))
    }

    /// Coupling map to advertise, `None` when unconstrained.
    pub fn coupling_map(&self) -> Option<Vec<(u32, u32)>> {
        match self.kind {
            TopologyKind::FullyConnected => None,
            _ => Some(self.edges.clone()),
        }
    }

    /// Qubits coupled to `q`, in edge order.
    pub fn neighbors(&self, q: u32) -> impl Iterator<Item = u32> + '_ {
        self.edges.iter().filter_map(move |&(a, b)| {
            if a == q {
                Some(b)
            } else if b == q {
                Some(a)
            } else {
                None
            }
        })
    }

    /// Whether `qubits` form a connected piece of the coupling graph.
    pub fn spans(&self, qubits: &[u32]) -> bool {
        let Some((&first, _)) = qubits.split_first() else {
            return true;
        };
        let mut reached = vec![first];
        let mut frontier = vec![first];
        while let Some(q) = frontier.pop() {
            for &other in qubits {
                if !reached.contains(&other) && self.is_connected(q, other) {
                    reached.push(other);
                    frontier.push(other);
                }
            }
        }
        qubits.iter().all(|q| reached.contains(q))
    }

    fn check(&self, inst: &Instruction) -> CalcResult<()> {
        if inst.name == "barrier" || inst.qubits.len() < 2 || self.spans(&inst.qubits) {
            return Ok(());
        }
        let qubits = inst
            .qubits
            .iter()
            .map(|q| format!("q[{q}]"))
            .collect::<Vec<_>>()
            .join(", ");
        Err(CalcError::CircuitError(format!(
            "'{}' on {qubits} is not connected in the coupling map",
            inst.name
        )))
    }
}

/// Kind of qubit topology.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[non_exhaustive]
pub enum TopologyKind {
    /// Fully connected (all-to-all).
    FullyConnected,
    /// Linear chain.
    Linear,
    /// Custom coupling map.
    Custom,
}
