//! Expression sequencing.
//!
//! Turns raw calculator text such as `"3+H-5"` into an alternating
//! operand/operator [`Sequence`]. Sequencing is total: malformed input
//! yields [`Sequence::empty`] rather than an error, so the same call serves
//! both "can this be computed?" checks and the computation itself.
//!
//! Splitting keeps the operators as separators, so `"3+"` becomes
//! `["3", "+", ""]` and is rejected by the empty trailing operand.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::BitWidth;

/// How operand tokens are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputMode {
    /// Unsigned decimal numbers, or `H` for a fully superposed operand.
    #[default]
    Decimal,
    /// Bit strings over `0`, `1`, `H`, most significant bit first.
    Binary,
}

/// One operand bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bit {
    Zero,
    One,
    /// Equal superposition of 0 and 1.
    Superposed,
}

impl Bit {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Bit::Zero),
            '1' => Some(Bit::One),
            'H' => Some(Bit::Superposed),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Bit::Zero => '0',
            Bit::One => '1',
            Bit::Superposed => 'H',
        }
    }
}

/// A normalized operand of exactly `qubits` bits, most significant first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operand {
    bits: Vec<Bit>,
}

impl Operand {
    /// Literal operand holding `value`. `None` if it does not fit `width`.
    pub fn literal(value: u64, width: BitWidth) -> Option<Self> {
        if value > width.max_value() {
            return None;
        }
        let n = width.qubits();
        let bits = (0..n)
            .rev()
            .map(|i| {
                if (value >> i) & 1 == 1 {
                    Bit::One
                } else {
                    Bit::Zero
                }
            })
            .collect();
        Some(Self { bits })
    }

    /// Operand with every bit superposed.
    pub fn superposed(width: BitWidth) -> Self {
        Self {
            bits: vec![Bit::Superposed; width.qubits() as usize],
        }
    }

    /// Parse and normalize a single operand token.
    ///
    /// The whole token must match:
    /// - `Decimal`: `H`, or one or more ASCII digits whose value fits `width`.
    /// - `Binary`: exactly `width` characters, either all `0`/`1` or all `H`.
    pub fn parse(token: &str, mode: InputMode, width: BitWidth) -> Option<Self> {
        match mode {
            InputMode::Decimal => {
                if token == "H" {
                    return Some(Self::superposed(width));
                }
                if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let value: u64 = token.parse().ok()?;
                Self::literal(value, width)
            }
            InputMode::Binary => {
                let bits = token
                    .chars()
                    .map(Bit::from_char)
                    .collect::<Option<Vec<_>>>()?;
                if bits.len() != width.qubits() as usize {
                    return None;
                }
                let superposed = bits.iter().filter(|b| **b == Bit::Superposed).count();
                if superposed != 0 && superposed != bits.len() {
                    return None;
                }
                Some(Self { bits })
            }
        }
    }

    /// Number of bits.
    pub fn width(&self) -> u32 {
        self.bits.len() as u32
    }

    /// Bits, most significant first.
    pub fn bits(&self) -> &[Bit] {
        &self.bits
    }

    /// Bit `i`, counting from the least significant bit.
    pub fn bit(&self, i: u32) -> Bit {
        self.bits[self.bits.len() - 1 - i as usize]
    }

    /// Whether any bit is superposed.
    pub fn is_superposed(&self) -> bool {
        self.bits.contains(&Bit::Superposed)
    }

    /// Integer value of a literal operand.
    pub fn value(&self) -> Option<u64> {
        self.bits.iter().try_fold(0_u64, |acc, bit| match bit {
            Bit::Zero => Some(acc << 1),
            Bit::One => Some((acc << 1) | 1),
            Bit::Superposed => None,
        })
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.bits {
            write!(f, "{}", bit.as_char())?;
        }
        Ok(())
    }
}

/// Arithmetic operator between two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Add,
    Subtract,
}

impl Operator {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Operator::Add),
            '-' => Some(Operator::Subtract),
            _ => None,
        }
    }

    /// Short tag used in progress messages.
    pub fn tag(self) -> &'static str {
        match self {
            Operator::Add => "ADD",
            Operator::Subtract => "SUB",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Add => write!(f, "+"),
            Operator::Subtract => write!(f, "-"),
        }
    }
}

/// Alternating `operand (operator operand)+` sequence, or empty.
///
/// A non-empty sequence always has `operators.len() + 1` operands and at
/// least one operator, all operands sharing one width.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sequence {
    operands: Vec<Operand>,
    operators: Vec<Operator>,
}

impl Sequence {
    /// The empty (rejected) sequence.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from already-normalized parts. Returns the empty sequence when
    /// the parts do not alternate or the widths disagree.
    pub fn from_parts(operands: Vec<Operand>, operators: Vec<Operator>) -> Self {
        let Some(first) = operands.first() else {
            return Self::empty();
        };
        if operators.is_empty()
            || operands.len() != operators.len() + 1
            || operands.iter().any(|o| o.width() != first.width())
        {
            return Self::empty();
        }
        Self {
            operands,
            operators,
        }
    }

    /// Whether sequencing failed.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Number of tokens (operands plus operators). Zero when empty.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.operands.len() + self.operators.len()
        }
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    /// Operand width, if non-empty.
    pub fn width(&self) -> Option<u32> {
        if self.is_empty() {
            None
        } else {
            self.operands.first().map(Operand::width)
        }
    }

    /// Whether any operand carries superposed bits.
    pub fn has_superposition(&self) -> bool {
        self.operands.iter().any(Operand::is_superposed)
    }

    /// The steps after the first operand: `(operator, right operand)` pairs.
    pub fn steps(&self) -> impl Iterator<Item = (Operator, &Operand)> {
        self.operators
            .iter()
            .copied()
            .zip(self.operands.iter().skip(1))
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(first) = self.operands.first() else {
            return Ok(());
        };
        write!(f, "{first}")?;
        for (op, operand) in self.steps() {
            write!(f, "{op}{operand}")?;
        }
        Ok(())
    }
}

/// Split `text` on `+`/`-`, keeping the operators.
fn split_tokens(text: &str) -> (Vec<&str>, Vec<Operator>) {
    let mut operands = Vec::new();
    let mut operators = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if let Some(op) = Operator::from_char(c) {
            operands.push(&text[start..i]);
            operators.push(op);
            start = i + c.len_utf8();
        }
    }
    operands.push(&text[start..]);
    (operands, operators)
}

/// Sequence raw expression text for the given mode and width.
///
/// Returns [`Sequence::empty`] when the text has no operator, a missing
/// operand, a token that does not match `mode`, or a value that does not fit
/// `width`.
pub fn sequence(text: &str, mode: InputMode, width: BitWidth) -> Sequence {
    let (tokens, operators) = split_tokens(text);
    if operators.is_empty() {
        return Sequence::empty();
    }
    let operands = tokens
        .into_iter()
        .map(|token| Operand::parse(token, mode, width))
        .collect::<Option<Vec<_>>>();
    match operands {
        Some(operands) => Sequence::from_parts(operands, operators),
        None => Sequence::empty(),
    }
}
