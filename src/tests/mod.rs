//! Scenario tests for the token store
//!
//! These drive [`crate::TokenStore`] against a recording storage double so
//! the exact storage traffic of each operation can be checked.

mod support;
