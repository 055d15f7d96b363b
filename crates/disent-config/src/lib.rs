//! Process-wide knobs shared by the disentanglement crates: seeded RNG
//! derivation and tracing subscriber setup.

pub mod determinism;
pub mod tracing;
