//! Property-based tests for sequencing, reversibility and literal arithmetic.

use proptest::prelude::*;
use quantum_calc::decode::decode_bitstring;
use quantum_calc::{
    Answer, BasisState, BitWidth, CircuitBuilder, InputMode, Synthesizer, Topology, route,
    sequence,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn width(qubits: u32) -> BitWidth {
    BitWidth::new(qubits, 1, 8).unwrap()
}

/// Widths together with an in-range value.
fn arb_width_and_value() -> impl Strategy<Value = (u32, u64)> {
    (1_u32..=8).prop_flat_map(|q| (Just(q), 0_u64..(1_u64 << q)))
}

/// Widths together with two in-range values.
fn arb_width_and_pair() -> impl Strategy<Value = (u32, u64, u64)> {
    (1_u32..=6).prop_flat_map(|q| (Just(q), 0_u64..(1_u64 << q), 0_u64..(1_u64 << q)))
}

/// Run the literal expression `text` on a single basis state.
fn evaluate(text: &str, qubits: u32) -> Answer {
    evaluate_on(text, qubits, Topology::full)
}

/// Same as [`evaluate`], routed onto the coupling map `topology(num_qubits)`.
fn evaluate_on(text: &str, qubits: u32, topology: fn(u32) -> Topology) -> Answer {
    let width = width(qubits);
    let synth = Synthesizer::new(width).unwrap();
    let seq = sequence(text, InputMode::Decimal, width);
    let lowered = synth
        .synthesize(&seq, 1)
        .unwrap()
        .lower("local_simulator", 1, 0)
        .unwrap();
    let compiled = route(&lowered, &topology(lowered.num_qubits)).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    let mut state = BasisState::new(compiled.num_qubits, compiled.num_clbits);
    for inst in &compiled.instructions {
        state.apply(inst, &mut rng).unwrap();
    }
    decode_bitstring(&state.bitstring(), qubits).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_decimal_operand_roundtrip((q, t) in arb_width_and_value()) {
        let seq = sequence(&format!("{t}+0"), InputMode::Decimal, width(q));
        prop_assert!(!seq.is_empty());
        prop_assert_eq!(seq.operands()[0].value(), Some(t));
        prop_assert_eq!(seq.operands()[0].width(), q);
    }

    #[test]
    fn test_out_of_range_decimal_is_rejected(q in 1_u32..=8, excess in 0_u64..1000) {
        let t = (1_u64 << q) + excess;
        let add_expr = format!("{t}+1");
        let sub_expr = format!("1-{t}");
        prop_assert!(sequence(&add_expr, InputMode::Decimal, width(q)).is_empty());
        prop_assert!(sequence(&sub_expr, InputMode::Decimal, width(q)).is_empty());
    }

    #[test]
    fn test_subtractor_undoes_adder(
        state in (1_u32..=6).prop_flat_map(|q| prop::collection::vec(any::<bool>(), (2 * q + 2) as usize))
    ) {
        let q = (state.len() as u32 - 2) / 2;
        let synth = Synthesizer::new(width(q)).unwrap();
        let mut builder = CircuitBuilder::new(width(q).layout()).unwrap();
        builder.extend(synth.adder()).unwrap();
        builder.extend(synth.subtractor()).unwrap();
        let compiled = builder.into_program(1).lower("local_simulator", 1, 0).unwrap();

        let mut rng = StdRng::seed_from_u64(0);
        let mut register = BasisState::from_qubits(state.clone(), compiled.num_clbits);
        for inst in &compiled.instructions {
            register.apply(inst, &mut rng).unwrap();
        }
        prop_assert_eq!(register.qubits(), state.as_slice());
    }

    #[test]
    fn test_literal_addition_matches_arithmetic((q, a, b) in arb_width_and_pair()) {
        let expected = if a + b < (1_u64 << q) {
            Answer::Value(a + b)
        } else {
            Answer::Overflow
        };
        prop_assert_eq!(evaluate(&format!("{a}+{b}"), q), expected);
    }

    #[test]
    fn test_literal_subtraction_matches_arithmetic((q, a, b) in arb_width_and_pair()) {
        let expected = if a >= b {
            Answer::Value(a - b)
        } else {
            Answer::Overflow
        };
        prop_assert_eq!(evaluate(&format!("{a}-{b}"), q), expected);
    }

    #[test]
    fn test_routed_chain_matches_unrouted(
        (q, a, b) in arb_width_and_pair(),
        c in 0_u64..4,
        subtract in any::<bool>(),
    ) {
        let op = if subtract { '-' } else { '+' };
        let c = c % (1_u64 << q);
        let text = format!("{a}{op}{b}+{c}");
        prop_assert_eq!(evaluate_on(&text, q, Topology::linear), evaluate(&text, q));
    }
}
