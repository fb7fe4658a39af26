//! Profile hidden Markov models: configuration of a trained core model into a search profile,
//! sampling of sequences and paths from either, and a striped 16-bit Viterbi filter.

pub mod alphabet;
pub mod bg;
pub mod emit;
pub mod error;
pub mod filter;
pub mod hmm;
pub mod profile;
pub mod sequence;
pub mod trace;
mod util;

pub use crate::error::{Error, Result};
