//! Resolution of engine color tags into a closed set of known standards.
//!
//! The engine reports primaries, transfer and matrix as free-form strings
//! (`"bt.2020"`, `"pq"`, `"bt.2020-ncl"`, ...). Matching is case-insensitive
//! and substring based, checked newest standard first so an ambiguous token
//! always resolves to the more modern one. Anything unrecognized becomes
//! `None`, which the display treats as passthrough.

use serde::{Deserialize, Serialize};

/// Color primaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primaries {
    Bt601,
    Bt709,
    DisplayP3,
    Bt2020,
}

impl Primaries {
    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bt601 => "BT.601",
            Self::Bt709 => "BT.709",
            Self::DisplayP3 => "Display P3",
            Self::Bt2020 => "BT.2020",
        }
    }
}

/// Transfer characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transfer {
    Bt709,
    Srgb,
    Gamma22,
    Linear,
    Pq,
    Hlg,
}

impl Transfer {
    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bt709 => "BT.709",
            Self::Srgb => "sRGB",
            Self::Gamma22 => "Gamma 2.2",
            Self::Linear => "Linear",
            Self::Pq => "PQ (ST 2084)",
            Self::Hlg => "HLG",
        }
    }

    /// Whether this transfer carries high dynamic range signal.
    pub fn is_hdr(&self) -> bool {
        matches!(self, Self::Pq | Self::Hlg)
    }
}

/// YCbCr matrix coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Matrix {
    Bt601,
    Bt709,
    Bt2020Ncl,
    Bt2020Cl,
}

impl Matrix {
    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bt601 => "BT.601",
            Self::Bt709 => "BT.709",
            Self::Bt2020Ncl => "BT.2020 NCL",
            Self::Bt2020Cl => "BT.2020 CL",
        }
    }
}

/// Resolve a primaries token such as `"bt.2020"` or `"display-p3"`.
pub fn resolve_primaries(token: &str) -> Option<Primaries> {
    let token = token.to_ascii_lowercase();
    if token.contains("2020") {
        Some(Primaries::Bt2020)
    } else if token.contains("p3") || token.contains("dci") {
        Some(Primaries::DisplayP3)
    } else if token.contains("709") {
        Some(Primaries::Bt709)
    } else if ["601", "170m", "smpte-c", "bt.470"]
        .iter()
        .any(|t| token.contains(t))
    {
        Some(Primaries::Bt601)
    } else {
        None
    }
}

/// Resolve a transfer token such as `"pq"`, `"hlg"` or `"bt.1886"`.
pub fn resolve_transfer(token: &str) -> Option<Transfer> {
    let token = token.to_ascii_lowercase();
    if token.contains("pq") || token.contains("2084") {
        Some(Transfer::Pq)
    } else if token.contains("hlg") || token.contains("arib") {
        Some(Transfer::Hlg)
    } else if token.contains("linear") {
        Some(Transfer::Linear)
    } else if token.contains("srgb") {
        Some(Transfer::Srgb)
    } else if token.contains("709") || token.contains("1886") {
        Some(Transfer::Bt709)
    } else if token.contains("gamma2.2") || token.contains("gamma22") {
        Some(Transfer::Gamma22)
    } else {
        None
    }
}

/// Resolve a matrix token such as `"bt.2020-ncl"` or `"bt.709"`.
pub fn resolve_matrix(token: &str) -> Option<Matrix> {
    let token = token.to_ascii_lowercase();
    if token.contains("2020") {
        if token.contains("cl") && !token.contains("ncl") {
            Some(Matrix::Bt2020Cl)
        } else {
            Some(Matrix::Bt2020Ncl)
        }
    } else if token.contains("709") {
        Some(Matrix::Bt709)
    } else if ["601", "170m", "470"].iter().any(|t| token.contains(t)) {
        Some(Matrix::Bt601)
    } else {
        None
    }
}

/// Signal peak passes through; values that cannot be a peak become `None`.
pub fn resolve_signal_peak(peak: f64) -> Option<f64> {
    (peak.is_finite() && peak > 0.0).then_some(peak)
}

/// Last known color properties of the playing stream.
///
/// Fields are independent: any subset may be unknown, and an unknown field
/// falls back to passthrough on the display side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ColorState {
    pub primaries: Option<Primaries>,
    pub transfer: Option<Transfer>,
    pub matrix: Option<Matrix>,
    pub signal_peak: Option<f64>,
}

impl ColorState {
    /// Apply a raw primaries token; `None` clears the field.
    pub fn apply_primaries(&mut self, token: Option<&str>) {
        self.primaries = token.and_then(resolve_primaries);
    }

    /// Apply a raw transfer token; `None` clears the field.
    pub fn apply_transfer(&mut self, token: Option<&str>) {
        self.transfer = token.and_then(resolve_transfer);
    }

    /// Apply a raw matrix token; `None` clears the field.
    pub fn apply_matrix(&mut self, token: Option<&str>) {
        self.matrix = token.and_then(resolve_matrix);
    }

    /// Apply a raw signal peak; `None` clears the field.
    pub fn apply_signal_peak(&mut self, peak: Option<f64>) {
        self.signal_peak = peak.and_then(resolve_signal_peak);
    }

    /// True when nothing is known about the stream's color.
    pub fn is_unknown(&self) -> bool {
        *self == Self::default()
    }
}
