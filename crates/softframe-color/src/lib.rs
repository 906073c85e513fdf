//! Softframe Color - engine color tags, color state and HDR/EDR attachments.

pub mod color_space;
pub mod hdr;

pub use color_space::{
    resolve_matrix, resolve_primaries, resolve_signal_peak, resolve_transfer, ColorState, Matrix,
    Primaries, Transfer,
};
pub use hdr::ColorAttachments;
