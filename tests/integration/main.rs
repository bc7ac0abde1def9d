//! Integration tests for the bridgectl CLI
//!
//! These tests spawn the actual binary and test end-to-end behavior.
//! None of them require a robot or network access.

mod cli_tests;
mod target_validation;
