//! Register-level gate IR.
//!
//! Gates address qubits by register group and bit index ([`QubitRef`]).
//! A [`CircuitBuilder`] accumulates gates against a [`RegisterLayout`],
//! rejecting out-of-range addresses as it goes, and yields either a reusable
//! [`Circuit`] fragment or a finished [`CircuitProgram`]. Backends lower a
//! program into a flat [`CompiledProgram`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::RegisterLayout;
use crate::error::{CalcError, CalcResult};

/// Quantum register groups of the calculator circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    CarryIn,
    OperandA,
    OperandB,
    CarryOut,
}

impl Register {
    /// Register name as used in emitted programs.
    pub fn name(self) -> &'static str {
        match self {
            Register::CarryIn => "cin",
            Register::OperandA => "qa",
            Register::OperandB => "qb",
            Register::CarryOut => "cout",
        }
    }

    /// Size of this register under `layout`.
    pub fn size(self, layout: &RegisterLayout) -> u32 {
        match self {
            Register::CarryIn | Register::CarryOut => 1,
            Register::OperandA | Register::OperandB => layout.qubits(),
        }
    }
}

/// A qubit addressed by register and bit index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QubitRef {
    pub register: Register,
    pub index: u32,
}

impl QubitRef {
    pub fn carry_in() -> Self {
        Self {
            register: Register::CarryIn,
            index: 0,
        }
    }

    pub fn a(index: u32) -> Self {
        Self {
            register: Register::OperandA,
            index,
        }
    }

    pub fn b(index: u32) -> Self {
        Self {
            register: Register::OperandB,
            index,
        }
    }

    pub fn carry_out() -> Self {
        Self {
            register: Register::CarryOut,
            index: 0,
        }
    }

    /// Flat qubit index under `layout`.
    pub fn flat_index(&self, layout: &RegisterLayout) -> CalcResult<u32> {
        let size = self.register.size(layout);
        if self.index >= size {
            return Err(CalcError::CircuitError(format!(
                "qubit {self} out of range for register of size {size}"
            )));
        }
        Ok(match self.register {
            Register::CarryIn => layout.carry_in(),
            Register::OperandA => layout.operand_a(self.index),
            Register::OperandB => layout.operand_b(self.index),
            Register::CarryOut => layout.carry_out(),
        })
    }
}

impl fmt::Display for QubitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.register.name(), self.index)
    }
}

/// A gate operation over register-addressed qubits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gate {
    X(QubitRef),
    H(QubitRef),
    Cx {
        control: QubitRef,
        target: QubitRef,
    },
    Ccx {
        control1: QubitRef,
        control2: QubitRef,
        target: QubitRef,
    },
    Reset(QubitRef),
    Barrier,
    Measure {
        qubit: QubitRef,
        clbit: u32,
    },
}

impl Gate {
    /// OpenQASM 3 gate name.
    pub fn name(&self) -> &'static str {
        match self {
            Gate::X(_) => "x",
            Gate::H(_) => "h",
            Gate::Cx { .. } => "cx",
            Gate::Ccx { .. } => "ccx",
            Gate::Reset(_) => "reset",
            Gate::Barrier => "barrier",
            Gate::Measure { .. } => "measure",
        }
    }

    /// Qubits this gate acts on, in operand order.
    pub fn qubits(&self) -> Vec<QubitRef> {
        match *self {
            Gate::X(q) | Gate::H(q) | Gate::Reset(q) => vec![q],
            Gate::Cx { control, target } => vec![control, target],
            Gate::Ccx {
                control1,
                control2,
                target,
            } => vec![control1, control2, target],
            Gate::Barrier => vec![],
            Gate::Measure { qubit, .. } => vec![qubit],
        }
    }

    /// Inverse gate, or `None` for non-unitary operations.
    ///
    /// Every unitary gate in this set is self-inverse.
    pub fn inverse(&self) -> Option<Gate> {
        match self {
            Gate::X(_) | Gate::H(_) | Gate::Cx { .. } | Gate::Ccx { .. } | Gate::Barrier => {
                Some(*self)
            }
            Gate::Reset(_) | Gate::Measure { .. } => None,
        }
    }
}

/// An immutable, named gate list that can be appended to programs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circuit {
    name: String,
    gates: Vec<Gate>,
}

impl Circuit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Time-reversed circuit: gate order reversed and each gate inverted.
    ///
    /// Fails on non-unitary gates, which have no inverse.
    pub fn reversed(&self, name: impl Into<String>) -> CalcResult<Circuit> {
        let gates = self
            .gates
            .iter()
            .rev()
            .map(|gate| {
                gate.inverse().ok_or_else(|| {
                    CalcError::CircuitError(format!(
                        "cannot reverse circuit '{}': '{}' is not invertible",
                        self.name,
                        gate.name()
                    ))
                })
            })
            .collect::<CalcResult<Vec<_>>>()?;
        Ok(Circuit {
            name: name.into(),
            gates,
        })
    }
}

/// A finished program ready for backend compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitProgram {
    layout: RegisterLayout,
    gates: Vec<Gate>,
    shots: u32,
}

impl CircuitProgram {
    /// Register layout the gates are addressed against.
    pub fn layout(&self) -> RegisterLayout {
        self.layout
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Shots requested for this program.
    pub fn shots(&self) -> u32 {
        self.shots
    }

    /// Number of measurement operations.
    pub fn num_measurements(&self) -> usize {
        self.gates
            .iter()
            .filter(|g| matches!(g, Gate::Measure { .. }))
            .count()
    }

    /// Lower to flat qubit indices for `backend_id`.
    ///
    /// This performs only the layout-independent part of compilation;
    /// backends check their own constraints on the result.
    pub fn lower(&self, backend_id: &str, shots: u32, seed: u64) -> CalcResult<CompiledProgram> {
        let layout = self.layout();
        let instructions = self
            .gates
            .iter()
            .map(|gate| {
                let qubits = if matches!(gate, Gate::Barrier) {
                    (0..layout.num_qubits()).collect()
                } else {
                    gate.qubits()
                        .iter()
                        .map(|q| q.flat_index(&layout))
                        .collect::<CalcResult<Vec<_>>>()?
                };
                let clbit = match gate {
                    Gate::Measure { clbit, .. } => Some(*clbit),
                    _ => None,
                };
                Ok(Instruction {
                    name: gate.name().to_string(),
                    qubits,
                    clbit,
                })
            })
            .collect::<CalcResult<Vec<_>>>()?;

        Ok(CompiledProgram {
            backend_id: backend_id.to_string(),
            num_qubits: layout.num_qubits(),
            num_clbits: layout.num_clbits(),
            shots,
            seed,
            instructions,
        })
    }
}

/// Accumulates gates against a register layout.
#[derive(Debug, Clone)]
pub struct CircuitBuilder {
    layout: RegisterLayout,
    gates: Vec<Gate>,
}

impl CircuitBuilder {
    /// Start an empty builder. Fails on a zero-width layout.
    pub fn new(layout: RegisterLayout) -> CalcResult<Self> {
        if layout.qubits() == 0 {
            return Err(CalcError::CircuitError(
                "cannot build a circuit over empty operand registers".into(),
            ));
        }
        Ok(Self {
            layout,
            gates: Vec::new(),
        })
    }

    pub fn layout(&self) -> RegisterLayout {
        self.layout
    }

    fn push(&mut self, gate: Gate) -> CalcResult<&mut Self> {
        let qubits = gate.qubits();
        for q in &qubits {
            q.flat_index(&self.layout)?;
        }
        for (i, q) in qubits.iter().enumerate() {
            if qubits[i + 1..].contains(q) {
                return Err(CalcError::CircuitError(format!(
                    "duplicate qubit {q} in '{}'",
                    gate.name()
                )));
            }
        }
        if let Gate::Measure { clbit, .. } = gate {
            if clbit >= self.layout.num_clbits() {
                return Err(CalcError::CircuitError(format!(
                    "classical bit ans[{clbit}] out of range for register of size {}",
                    self.layout.num_clbits()
                )));
            }
        }
        self.gates.push(gate);
        Ok(self)
    }

    pub fn x(&mut self, q: QubitRef) -> CalcResult<&mut Self> {
        self.push(Gate::X(q))
    }

    pub fn h(&mut self, q: QubitRef) -> CalcResult<&mut Self> {
        self.push(Gate::H(q))
    }

    pub fn cx(&mut self, control: QubitRef, target: QubitRef) -> CalcResult<&mut Self> {
        self.push(Gate::Cx { control, target })
    }

    pub fn ccx(
        &mut self,
        control1: QubitRef,
        control2: QubitRef,
        target: QubitRef,
    ) -> CalcResult<&mut Self> {
        self.push(Gate::Ccx {
            control1,
            control2,
            target,
        })
    }

    pub fn reset(&mut self, q: QubitRef) -> CalcResult<&mut Self> {
        self.push(Gate::Reset(q))
    }

    pub fn barrier(&mut self) -> CalcResult<&mut Self> {
        self.push(Gate::Barrier)
    }

    pub fn measure(&mut self, qubit: QubitRef, clbit: u32) -> CalcResult<&mut Self> {
        self.push(Gate::Measure { qubit, clbit })
    }

    /// Append every gate of `circuit`.
    pub fn extend(&mut self, circuit: &Circuit) -> CalcResult<&mut Self> {
        for gate in circuit.gates() {
            self.push(*gate)?;
        }
        Ok(self)
    }

    /// Finish as a reusable fragment.
    pub fn into_circuit(self, name: impl Into<String>) -> Circuit {
        Circuit {
            name: name.into(),
            gates: self.gates,
        }
    }

    /// Finish as a complete program.
    pub fn into_program(self, shots: u32) -> CircuitProgram {
        CircuitProgram {
            layout: self.layout,
            gates: self.gates,
            shots,
        }
    }
}

/// One instruction over flat qubit indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// OpenQASM 3 gate name.
    pub name: String,
    pub qubits: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clbit: Option<u32>,
}

/// A program compiled for a specific backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledProgram {
    pub backend_id: String,
    pub num_qubits: u32,
    pub num_clbits: u32,
    pub shots: u32,
    pub seed: u64,
    pub instructions: Vec<Instruction>,
}

impl CompiledProgram {
    /// Render as OpenQASM 3 over a flat register `q` and output register `ans`.
    pub fn to_qasm(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CompiledProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "OPENQASM 3.0;")?;
        writeln!(f, "include \"stdgates.inc\";")?;
        writeln!(f, "qubit[{}] q;", self.num_qubits)?;
        writeln!(f, "bit[{}] ans;", self.num_clbits)?;
        for inst in &self.instructions {
            if let Some(c) = inst.clbit {
                write!(f, "ans[{c}] = measure")?;
            } else {
                write!(f, "{}", inst.name)?;
            }
            for (i, q) in inst.qubits.iter().enumerate() {
                write!(f, "{}q[{q}]", if i == 0 { " " } else { ", " })?;
            }
            writeln!(f, ";")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BitWidth;

    fn layout(n: u32) -> RegisterLayout {
        BitWidth::new(n, 1, 8).unwrap().layout()
    }

    #[test]
    fn test_flat_index() {
        let l = layout(3);
        assert_eq!(QubitRef::carry_in().flat_index(&l).unwrap(), 0);
        assert_eq!(QubitRef::a(2).flat_index(&l).unwrap(), 3);
        assert_eq!(QubitRef::b(0).flat_index(&l).unwrap(), 4);
        assert_eq!(QubitRef::carry_out().flat_index(&l).unwrap(), 7);
        assert!(QubitRef::a(3).flat_index(&l).is_err());
    }

    #[test]
    fn test_builder_rejects_bad_operands() {
        let mut builder = CircuitBuilder::new(layout(2)).unwrap();
        assert!(builder.x(QubitRef::b(2)).is_err());
        assert!(builder.cx(QubitRef::a(0), QubitRef::a(0)).is_err());
        assert!(builder.measure(QubitRef::a(0), 3).is_err());
        assert!(builder.measure(QubitRef::a(0), 2).is_ok());
        assert!(CircuitBuilder::new(RegisterLayout::new(0)).is_err());
    }

    #[test]
    fn test_reversed_inverts_order() {
        let mut builder = CircuitBuilder::new(layout(2)).unwrap();
        builder
            .cx(QubitRef::a(0), QubitRef::b(0))
            .unwrap()
            .ccx(QubitRef::a(0), QubitRef::b(0), QubitRef::carry_out())
            .unwrap();
        let circuit = builder.into_circuit("fwd");
        let rev = circuit.reversed("rev").unwrap();
        assert_eq!(rev.name(), "rev");
        assert_eq!(rev.gates()[0].name(), "ccx");
        assert_eq!(rev.gates()[1].name(), "cx");
        assert_eq!(rev.reversed("fwd").unwrap(), circuit);
    }

    #[test]
    fn test_reversed_rejects_reset() {
        let mut builder = CircuitBuilder::new(layout(1)).unwrap();
        builder.reset(QubitRef::a(0)).unwrap();
        let err = builder.into_circuit("r").reversed("rr").unwrap_err();
        assert!(matches!(err, CalcError::CircuitError(_)));
    }

    #[test]
    fn test_lower_and_qasm() {
        let mut builder = CircuitBuilder::new(layout(1)).unwrap();
        builder
            .x(QubitRef::a(0))
            .unwrap()
            .barrier()
            .unwrap()
            .measure(QubitRef::a(0), 0)
            .unwrap();
        let program = builder.into_program(2);
        assert_eq!(program.num_measurements(), 1);

        let compiled = program.lower("local_simulator", 2, 1).unwrap();
        assert_eq!(compiled.num_qubits, 4);
        assert_eq!(compiled.num_clbits, 2);
        assert_eq!(compiled.instructions[0].qubits, vec![1]);
        assert_eq!(compiled.instructions[1].qubits, vec![0, 1, 2, 3]);

        let qasm = compiled.to_qasm();
        assert!(qasm.contains("qubit[4] q;"));
        assert!(qasm.contains("x q[1];"));
        assert!(qasm.contains("ans[0] = measure q[1];"));
        assert!(qasm.contains("barrier q[0], q[1], q[2], q[3];"));
        assert!(qasm.ends_with("ans[0] = measure q[1];\n"));
    }
}
