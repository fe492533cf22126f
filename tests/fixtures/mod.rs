//! Test fixtures for parking-nav.
//!
//! Provides:
//! - Real Las Vegas parking garage locations (from OpenStreetMap)
//! - Fakes for the clock, the platform position source and routing providers
//! - Hand-built routes with known geometry

#![allow(dead_code)]

pub mod fakes;
pub mod parking_locations;

pub use fakes::*;
pub use parking_locations::*;
