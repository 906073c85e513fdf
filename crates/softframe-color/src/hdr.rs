//! Per-frame color attachments and EDR detection.

use crate::color_space::{ColorState, Matrix, Primaries, Transfer};
use serde::{Deserialize, Serialize};

/// Reference white in nits used to express headroom.
pub const REFERENCE_WHITE_NITS: f64 = 203.0;

/// PQ peak luminance in nits.
pub const PQ_PEAK_NITS: f64 = 10000.0;

/// Nominal HLG peak luminance in nits.
pub const HLG_PEAK_NITS: f64 = 1000.0;

/// Color metadata attached to a delivered frame.
///
/// `None` fields tell the display to use its default passthrough handling.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ColorAttachments {
    pub primaries: Option<Primaries>,
    pub transfer: Option<Transfer>,
    pub matrix: Option<Matrix>,
    /// The frame exceeds standard dynamic range and the display should
    /// widen its output range.
    pub edr: bool,
    /// Peak brightness relative to reference white (>= 1.0).
    pub headroom: f64,
}

impl ColorAttachments {
    /// Attachments for a stream with no known color information.
    pub const PASSTHROUGH: Self = Self {
        primaries: None,
        transfer: None,
        matrix: None,
        edr: false,
        headroom: 1.0,
    };

    /// Derive attachments from a color state snapshot.
    pub fn from_state(state: &ColorState) -> Self {
        let peak_edr = state.signal_peak.is_some_and(|p| p > 1.0);
        let edr = state.transfer.is_some_and(|t| t.is_hdr()) || peak_edr;

        let headroom = match (state.signal_peak, state.transfer) {
            (Some(peak), _) => peak,
            (None, Some(Transfer::Pq)) => PQ_PEAK_NITS / REFERENCE_WHITE_NITS,
            (None, Some(Transfer::Hlg)) => HLG_PEAK_NITS / REFERENCE_WHITE_NITS,
            _ => 1.0,
        }
        .max(1.0);

        Self {
            primaries: state.primaries,
            transfer: state.transfer,
            matrix: state.matrix,
            edr,
            headroom,
        }
    }

    /// True when every field defers to the display default.
    pub fn is_passthrough(&self) -> bool {
        self.primaries.is_none() && self.transfer.is_none() && self.matrix.is_none() && !self.edr
    }
}
