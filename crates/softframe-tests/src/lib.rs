//! Integration test crate for softframe.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It drives the full pipeline against the synthetic engine and a
//! recording display sink.

#[cfg(test)]
mod support;

#[cfg(test)]
mod lifecycle;

#[cfg(test)]
mod presentation;

#[cfg(test)]
mod subtitles;
