//! Calculator configuration and bit-width layout.
//!
//! The configuration source (a settings file, a UI, environment) is outside
//! this crate. It hands over a [`CalcConfig`], from which the controller
//! resolves the validated [`BitWidth`] used for every computation.

use serde::{Deserialize, Serialize};

use crate::error::{CalcError, CalcResult};

/// Backend used when none is configured.
pub const DEFAULT_BACKEND: &str = "local_simulator";

/// Hard ceiling on operand width; values are carried in `u64`.
pub const MAX_QUBITS: u32 = 32;

/// Validated operand bit width.
///
/// Invariant: `min <= qubits <= max` and `min >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitWidth {
    qubits: u32,
    min: u32,
    max: u32,
}

impl BitWidth {
    /// Create a bit width, checking it against the allowed range.
    pub fn new(qubits: u32, min: u32, max: u32) -> CalcResult<Self> {
        if min == 0 {
            return Err(CalcError::Configuration(
                "qubits_min must be at least 1".into(),
            ));
        }
        if max > MAX_QUBITS {
            return Err(CalcError::Configuration(format!(
                "qubits_max ({max}) exceeds the limit of {MAX_QUBITS}"
            )));
        }
        if min > max {
            return Err(CalcError::Configuration(format!(
                "qubits_min ({min}) exceeds qubits_max ({max})"
            )));
        }
        if !(min..=max).contains(&qubits) {
            return Err(CalcError::Configuration(format!(
                "qubits must be in {min}..={max}, got {qubits}"
            )));
        }
        Ok(Self { qubits, min, max })
    }

    /// Operand width in bits.
    pub fn qubits(&self) -> u32 {
        self.qubits
    }

    /// Smallest allowed width.
    pub fn min(&self) -> u32 {
        self.min
    }

    /// Largest allowed width.
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Same range, different width.
    pub fn with_qubits(&self, qubits: u32) -> CalcResult<Self> {
        Self::new(qubits, self.min, self.max)
    }

    /// Largest value an operand can hold.
    pub fn max_value(&self) -> u64 {
        (1_u64 << self.qubits) - 1
    }

    /// Register layout derived from this width.
    pub fn layout(&self) -> RegisterLayout {
        RegisterLayout::new(self.qubits)
    }
}

impl Default for BitWidth {
    fn default() -> Self {
        Self {
            qubits: 3,
            min: 1,
            max: 8,
        }
    }
}

/// Flat qubit layout of the four register groups.
///
/// ```text
///   index:  0 | 1 ..= n   | n+1 ..= 2n | 2n+1
///           cin  operand_a   operand_b   cout
/// ```
///
/// The classical register `ans` has `n + 1` bits: the sum in `0..n`
/// and the carry-out in bit `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterLayout {
    qubits: u32,
}

impl RegisterLayout {
    /// Layout for `qubits`-bit operands. Not range-checked; see [`BitWidth`].
    pub fn new(qubits: u32) -> Self {
        Self { qubits }
    }

    /// Operand width.
    pub fn qubits(&self) -> u32 {
        self.qubits
    }

    /// Total number of qubits across all four registers.
    pub fn num_qubits(&self) -> u32 {
        2 * self.qubits + 2
    }

    /// Width of the classical output register.
    pub fn num_clbits(&self) -> u32 {
        self.qubits + 1
    }

    /// Flat index of the carry-in qubit.
    pub fn carry_in(&self) -> u32 {
        0
    }

    /// Flat index of bit `i` of `operand_a`.
    pub fn operand_a(&self, i: u32) -> u32 {
        1 + i
    }

    /// Flat index of bit `i` of `operand_b`.
    pub fn operand_b(&self, i: u32) -> u32 {
        1 + self.qubits + i
    }

    /// Flat index of the carry-out qubit.
    pub fn carry_out(&self) -> u32 {
        2 * self.qubits + 1
    }
}

/// Resolved calculator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcConfig {
    /// Backend identifier passed through to the backend client.
    pub backend_id: String,
    /// Whether the backend is a remote service.
    pub remote: bool,
    /// Operand width.
    pub qubits: u32,
    /// Smallest selectable width.
    pub qubits_min: u32,
    /// Largest selectable width.
    pub qubits_max: u32,
    /// Shots for programs without superposed input.
    pub base_shots: u32,
    /// Seed handed to the backend compiler.
    pub seed: u64,
}

impl CalcConfig {
    /// Parse a JSON configuration document. Missing keys take defaults.
    pub fn from_json(json: &str) -> CalcResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CalcError::Configuration(format!("invalid config: {e}")))?;
        config.bit_width()?;
        Ok(config)
    }

    /// Select a backend. Ids starting with `local_` are treated as local.
    pub fn with_backend(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = backend_id.into();
        self.remote = !self.backend_id.starts_with("local_");
        self
    }

    /// Set the operand width.
    pub fn with_qubits(mut self, qubits: u32) -> Self {
        self.qubits = qubits;
        self
    }

    /// Resolve the validated bit width.
    pub fn bit_width(&self) -> CalcResult<BitWidth> {
        BitWidth::new(self.qubits, self.qubits_min, self.qubits_max)
    }
}

impl Default for CalcConfig {
    fn default() -> Self {
        let width = BitWidth::default();
        Self {
            backend_id: DEFAULT_BACKEND.into(),
            remote: false,
            qubits: width.qubits(),
            qubits_min: width.min(),
            qubits_max: width.max(),
            base_shots: 2,
            seed: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_width_range() {
        assert!(BitWidth::new(3, 1, 8).is_ok());
        assert!(BitWidth::new(0, 1, 8).is_err());
        assert!(BitWidth::new(9, 1, 8).is_err());
        assert!(BitWidth::new(3, 0, 8).is_err());
        assert!(BitWidth::new(3, 5, 4).is_err());
        assert!(BitWidth::new(3, 1, 64).is_err());
    }

    #[test]
    fn test_layout_indices() {
        let layout = BitWidth::new(3, 1, 8).unwrap().layout();
        assert_eq!(layout.num_qubits(), 8);
        assert_eq!(layout.num_clbits(), 4);
        assert_eq!(layout.carry_in(), 0);
        assert_eq!(layout.operand_a(0), 1);
        assert_eq!(layout.operand_a(2), 3);
        assert_eq!(layout.operand_b(0), 4);
        assert_eq!(layout.carry_out(), 7);
    }

    #[test]
    fn test_config_from_json_defaults() {
        let config = CalcConfig::from_json(r#"{"qubits": 4}"#).unwrap();
        assert_eq!(config.qubits, 4);
        assert_eq!(config.backend_id, DEFAULT_BACKEND);
        assert_eq!(config.base_shots, 2);
        assert_eq!(config.bit_width().unwrap().max_value(), 15);
    }

    #[test]
    fn test_config_from_json_rejects_width() {
        let err = CalcConfig::from_json(r#"{"qubits": 12, "qubits_max": 8}"#).unwrap_err();
        assert!(matches!(err, CalcError::Configuration(_)));
        assert!(CalcConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_with_backend_sets_remote() {
        let config = CalcConfig::default().with_backend("ibmqx4");
        assert!(config.remote);
        let config = config.with_backend("local_linear");
        assert!(!config.remote);
    }
}
