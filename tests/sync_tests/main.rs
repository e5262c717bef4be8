//! Client sync test suite
//!
//! Every test runs real record servers on ephemeral ports. Unreachable
//! and slow servers stand in for outages.
