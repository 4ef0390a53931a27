//! GPU mining daemon for the Ember network.
//!
//! The crate is organized around [`robot::Robot`], which drives a pool of
//! [`device::Device`]s against one [`work::WorkSource`]. Compute kernels sit
//! behind [`compute::ComputeBackend`]; the built-in CPU backend exists for
//! development and testing, hardware backends plug in through the same trait.

pub mod api;
pub mod compute;
pub mod config;
pub mod device;
pub mod error;
pub mod merkle;
pub mod pow;
pub mod robot;
pub mod stats;
pub mod tracing;
pub mod types;
pub mod work;
