//! # Scenario Tests
//!
//! Tests that drive several modules together: the scheduler with real
//! background workers, and panels rendering scheduler-fed sources onto the
//! shared frame buffer. Module-level unit tests live next to their code.
