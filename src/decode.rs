//! Histogram decoding.
//!
//! Each measured bitstring is `cout s(n-1) ... s0`. A set carry-out means
//! the result did not fit in `n` bits and decodes to the overflow sentinel
//! `OR`; otherwise the low `n` bits are the unsigned answer. Answers are
//! ranked by descending count and deduplicated, keeping the first rank.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CalcError, CalcResult};
use crate::result::Counts;

/// Sentinel shown for out-of-range results.
pub const OVERFLOW_SENTINEL: &str = "OR";

/// One decoded outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Answer {
    Value(u64),
    /// Carry-out was set.
    Overflow,
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Value(v) => write!(f, "{v}"),
            Answer::Overflow => write!(f, "{OVERFLOW_SENTINEL}"),
        }
    }
}

/// Distinct answers in rank order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSet(Vec<Answer>);

impl AnswerSet {
    pub fn answers(&self) -> &[Answer] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the set has exactly one answer.
    pub fn is_deterministic(&self) -> bool {
        self.0.len() == 1
    }

    /// Answers as strings, e.g. `["5", "OR"]`.
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for AnswerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, answer) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{answer}")?;
        }
        Ok(())
    }
}

/// One histogram entry after decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedRow {
    pub answer: Answer,
    pub bitstring: String,
    pub count: u64,
}

/// Decoder output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoded {
    rows: Vec<DecodedRow>,
    answers: AnswerSet,
}

impl Decoded {
    /// Every histogram entry, ranked by descending count.
    pub fn rows(&self) -> &[DecodedRow] {
        &self.rows
    }

    pub fn answers(&self) -> &AnswerSet {
        &self.answers
    }

    /// Comma-joined answers, e.g. `"5"` or `"0,OR,3"`.
    pub fn answer_string(&self) -> String {
        self.answers.to_string()
    }

    /// Status line for a completed computation.
    pub fn status(&self) -> String {
        let n = self.answers.len();
        format!("Completed: {n} answer{}", if n == 1 { "" } else { "s" })
    }

    pub fn total_shots(&self) -> u64 {
        self.rows.iter().map(|r| r.count).sum()
    }
}

/// Decode one `cout + sum` bitstring.
pub fn decode_bitstring(bitstring: &str, qubits: u32) -> CalcResult<Answer> {
    let expected = qubits as usize + 1;
    if bitstring.len() != expected || !bitstring.bytes().all(|b| b == b'0' || b == b'1') {
        return Err(CalcError::CircuitError(format!(
            "unexpected measurement '{bitstring}': expected {expected} binary digits"
        )));
    }
    let (carry, sum) = bitstring.split_at(1);
    if carry == "1" {
        return Ok(Answer::Overflow);
    }
    u64::from_str_radix(sum, 2)
        .map(Answer::Value)
        .map_err(|e| CalcError::CircuitError(format!("unreadable sum '{sum}': {e}")))
}

/// Decode a histogram for `qubits`-bit operands.
///
/// Fails with [`CalcError::CircuitError`] if any key has the wrong width.
pub fn decode(counts: &Counts, qubits: u32) -> CalcResult<Decoded> {
    let mut rows = Vec::with_capacity(counts.len());
    let mut answers: Vec<Answer> = Vec::new();
    for (bitstring, count) in counts.sorted() {
        let answer = decode_bitstring(bitstring, qubits)?;
        if !answers.contains(&answer) {
            answers.push(answer);
        }
        rows.push(DecodedRow {
            answer,
            bitstring: bitstring.to_string(),
            count,
        });
    }
    Ok(Decoded {
        rows,
        answers: AnswerSet(answers),
    })
}
