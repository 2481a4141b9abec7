//! Attestor CLI - issue and verify confidential-computing attestation tokens.

pub mod commands;
