//! Technical indicator implementations.

pub mod ema;
