//! Polyvox Core - real-time primitives for the polyphonic voice engine
//!
//! This crate holds the small, allocation-free building blocks that the
//! envelopes, voices and voice allocator in `polyvox-synth` are made of.
//!
//! # Core Abstractions
//!
//! ## Buffers
//!
//! - [`ChannelBuffer`] - Fixed-capacity multi-channel block shared by voices and the mixer
//!
//! ## Time
//!
//! - [`Ramp`] - Time-addressed linear segments with a small history ring
//!
//! ## Signal Processing
//!
//! - [`DelayLine`] - Circular delay with fractional reads
//! - [`Biquad`] - RBJ low-pass filter
//! - [`Xorshift32`] / [`deterministic_random`] - Reproducible noise
//!
//! ## Utilities
//!
//! - [`Tuning`] - Pitch to frequency
//! - Math functions: [`lerp`], [`curve_ease`], [`pan_gains`], [`flush_denormal`], [`wrap_phase`]
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible. Disable the default `std` feature in
//! your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! polyvox-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: allocation happens in constructors only
//! - **Deterministic**: `libm` math and seeded noise, no global state
//! - **Pure queries**: [`Ramp::value`] and friends never mutate

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod biquad;
pub mod channel_buffer;
pub mod delay;
pub mod math;
pub mod ramp;
pub mod random;
pub mod tuning;

pub use biquad::Biquad;
pub use channel_buffer::{ChannelBuffer, MAX_CHANNELS};
pub use delay::DelayLine;
pub use math::{clamp, curve_ease, flush_denormal, lerp, pan_gains, wrap_phase};
pub use ramp::{RAMP_SEGMENTS, Ramp, RampData};
pub use random::{Xorshift32, deterministic_random};
pub use tuning::Tuning;
