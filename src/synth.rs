//! Circuit synthesis for chained addition and subtraction.
//!
//! Each arithmetic step is the ripple-carry adder of Cuccaro et al.
//! (quant-ph/0410184): a forward pass of MAJ triads carries upward through
//! the operand bits, the top carry is copied into `cout`, and a backward pass
//! of UMA triads leaves the sum in `operand_a` while restoring `operand_b`
//! and `cin`. The subtractor is the same gate list run backwards.
//!
//! Chaining keeps the running result in `operand_a`:
//!
//! ```text
//!   step 0:  load op0 -> qa, op1 -> qb, apply ADD/SUB
//!   step k:  reset cin, cout, qb; load op(k+1) -> qb, apply ADD/SUB
//!   last:    barrier; measure qa[i] -> ans[i], cout -> ans[n]
//! ```

use tracing::debug;

use crate::circuit::{Circuit, CircuitBuilder, CircuitProgram, QubitRef};
use crate::config::BitWidth;
use crate::error::{CalcError, CalcResult};
use crate::sequence::{Bit, Operand, Operator, Sequence};

/// Shots multiplier per basis state when an operand is superposed.
const SUPERPOSED_SHOTS_PER_STATE: u64 = 5;

/// Builds calculator programs for one bit width.
///
/// The adder is built once on construction; the subtractor is derived from
/// it by reversal.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    width: BitWidth,
    adder: Circuit,
    subtractor: Circuit,
}

impl Synthesizer {
    /// Build the adder and subtractor for `width`.
    pub fn new(width: BitWidth) -> CalcResult<Self> {
        let adder = ripple_carry_adder(width)?;
        let subtractor = adder.reversed("qsub")?;
        debug!(
            qubits = width.qubits(),
            gates = adder.len(),
            "built ripple-carry adder"
        );
        Ok(Self {
            width,
            adder,
            subtractor,
        })
    }

    pub fn width(&self) -> BitWidth {
        self.width
    }

    pub fn adder(&self) -> &Circuit {
        &self.adder
    }

    pub fn subtractor(&self) -> &Circuit {
        &self.subtractor
    }

    /// Circuit applied for `op`.
    pub fn circuit_for(&self, op: Operator) -> &Circuit {
        match op {
            Operator::Add => &self.adder,
            Operator::Subtract => &self.subtractor,
        }
    }

    /// Shots for `sequence`: `base_shots`, raised to `5 * 2^qubits` when any
    /// operand is superposed.
    pub fn shots_for(&self, sequence: &Sequence, base_shots: u32) -> u32 {
        if sequence.has_superposition() {
            let sampled = 1_u64
                .checked_shl(self.width.qubits())
                .map_or(u64::MAX, |states| states.saturating_mul(SUPERPOSED_SHOTS_PER_STATE));
            base_shots.max(u32::try_from(sampled).unwrap_or(u32::MAX))
        } else {
            base_shots
        }
    }

    /// Fold `sequence` into one program, measuring only after the last step.
    pub fn synthesize(&self, sequence: &Sequence, base_shots: u32) -> CalcResult<CircuitProgram> {
        let first = match sequence.operands().first() {
            Some(first) if !sequence.is_empty() => first,
            _ => {
                return Err(CalcError::SyntaxError(
                    "cannot synthesize an empty sequence".into(),
                ));
            }
        };
        let mut builder = CircuitBuilder::new(self.width.layout())?;

        self.check_width(first)?;
        load(&mut builder, first, QubitRef::a)?;

        for (k, (op, operand)) in sequence.steps().enumerate() {
            self.check_width(operand)?;
            if k > 0 {
                reset_inputs(&mut builder, self.width.qubits())?;
            }
            load(&mut builder, operand, QubitRef::b)?;
            builder.extend(self.circuit_for(op))?;
        }

        measure(&mut builder, self.width.qubits())?;
        let shots = self.shots_for(sequence, base_shots);
        debug!(sequence = %sequence, shots, "synthesized program");
        Ok(builder.into_program(shots))
    }

    fn check_width(&self, operand: &Operand) -> CalcResult<()> {
        if operand.width() != self.width.qubits() {
            return Err(CalcError::CircuitError(format!(
                "operand {operand} has {} bits, register bank has {}",
                operand.width(),
                self.width.qubits()
            )));
        }
        Ok(())
    }
}

/// Cuccaro ripple-carry adder: `qa <- qa + qb`, carry into `cout`.
fn ripple_carry_adder(width: BitWidth) -> CalcResult<Circuit> {
    let n = width.qubits();
    let mut b = CircuitBuilder::new(width.layout())?;

    majority(&mut b, QubitRef::carry_in(), QubitRef::a(0), QubitRef::b(0))?;
    for i in 0..n - 1 {
        majority(&mut b, QubitRef::b(i), QubitRef::a(i + 1), QubitRef::b(i + 1))?;
    }

    b.cx(QubitRef::b(n - 1), QubitRef::carry_out())?;

    for i in (0..n - 1).rev() {
        unmajority(&mut b, QubitRef::b(i), QubitRef::a(i + 1), QubitRef::b(i + 1))?;
    }
    unmajority(&mut b, QubitRef::carry_in(), QubitRef::a(0), QubitRef::b(0))?;

    Ok(b.into_circuit("qadd"))
}

/// MAJ: leaves the carry out of `(c, s, t)` on `t`.
fn majority(b: &mut CircuitBuilder, c: QubitRef, s: QubitRef, t: QubitRef) -> CalcResult<()> {
    b.cx(t, s)?.cx(t, c)?.ccx(c, s, t)?;
    Ok(())
}

/// UMA: undoes MAJ on `c` and `t`, leaving the sum bit on `s`.
fn unmajority(b: &mut CircuitBuilder, c: QubitRef, s: QubitRef, t: QubitRef) -> CalcResult<()> {
    b.ccx(c, s, t)?.cx(t, c)?.cx(c, s)?;
    Ok(())
}

/// Load operand bits into a register that is known to hold zero.
fn load(
    b: &mut CircuitBuilder,
    operand: &Operand,
    qubit: fn(u32) -> QubitRef,
) -> CalcResult<()> {
    for i in 0..operand.width() {
        match operand.bit(i) {
            Bit::Zero => {}
            Bit::One => {
                b.x(qubit(i))?;
            }
            Bit::Superposed => {
                b.h(qubit(i))?;
            }
        }
    }
    Ok(())
}

/// Clear carry registers and `qb` before loading the next operand.
fn reset_inputs(b: &mut CircuitBuilder, n: u32) -> CalcResult<()> {
    b.reset(QubitRef::carry_in())?.reset(QubitRef::carry_out())?;
    for i in 0..n {
        b.reset(QubitRef::b(i))?;
    }
    Ok(())
}

fn measure(b: &mut CircuitBuilder, n: u32) -> CalcResult<()> {
    b.barrier()?;
    for i in 0..n {
        b.measure(QubitRef::a(i), i)?;
    }
    b.measure(QubitRef::carry_out(), n)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Gate;
    use crate::sequence::{InputMode, sequence};

    fn synth(n: u32) -> Synthesizer {
        Synthesizer::new(BitWidth::new(n, 1, 8).unwrap()).unwrap()
    }

    #[test]
    fn test_adder_gate_count() {
        // 2n MAJ/UMA triads plus the carry tap.
        for n in 1..=5 {
            let s = synth(n);
            assert_eq!(s.adder().len() as u32, 6 * n + 1);
        }
    }

    #[test]
    fn test_subtractor_is_reversed_adder() {
        let s = synth(3);
        let fwd = s.adder().gates();
        let rev = s.subtractor().gates();
        assert_eq!(fwd.len(), rev.len());
        for (a, b) in fwd.iter().zip(rev.iter().rev()) {
            assert_eq!(a, b);
        }
        assert_eq!(s.subtractor().name(), "qsub");
    }

    #[test]
    fn test_synthesize_literal_program() {
        let s = synth(3);
        let seq = sequence("3+2", InputMode::Decimal, s.width());
        let program = s.synthesize(&seq, 2).unwrap();
        assert_eq!(program.shots(), 2);
        assert_eq!(program.num_measurements(), 4);

        // 3 = 011 -> two X on qa, 2 = 010 -> one X on qb.
        let xs: Vec<_> = program
            .gates()
            .iter()
            .filter_map(|g| match g {
                Gate::X(q) => Some(*q),
                _ => None,
            })
            .collect();
        assert_eq!(xs, vec![QubitRef::a(0), QubitRef::a(1), QubitRef::b(1)]);
        assert!(!program.gates().iter().any(|g| matches!(g, Gate::Reset(_))));
    }

    #[test]
    fn test_superposed_input_raises_shots() {
        let s = synth(2);
        let seq = sequence("H+1", InputMode::Decimal, s.width());
        let program = s.synthesize(&seq, 2).unwrap();
        assert_eq!(program.shots(), 20);
        let hs = program
            .gates()
            .iter()
            .filter(|g| matches!(g, Gate::H(_)))
            .count();
        assert_eq!(hs, 2);
    }

    #[test]
    fn test_chained_steps_reset_and_measure_once() {
        let s = synth(3);
        let seq = sequence("1+2-3+1", InputMode::Decimal, s.width());
        let program = s.synthesize(&seq, 2).unwrap();
        let resets = program
            .gates()
            .iter()
            .filter(|g| matches!(g, Gate::Reset(_)))
            .count();
        // Two chained steps, each resetting cin, cout and three qb bits.
        assert_eq!(resets, 2 * 5);
        assert_eq!(program.num_measurements(), 4);
        let first_measure = program
            .gates()
            .iter()
            .position(|g| matches!(g, Gate::Measure { .. }))
            .unwrap();
        assert!(
            program.gates()[first_measure..]
                .iter()
                .all(|g| matches!(g, Gate::Measure { .. }))
        );
    }

    #[test]
    fn test_rejects_empty_and_mismatched() {
        let s = synth(3);
        assert!(matches!(
            s.synthesize(&Sequence::empty(), 2),
            Err(CalcError::SyntaxError(_))
        ));

        let other = BitWidth::new(2, 1, 8).unwrap();
        let seq = sequence("1+1", InputMode::Decimal, other);
        assert!(matches!(
            s.synthesize(&seq, 2),
            Err(CalcError::CircuitError(_))
        ));
    }
}
