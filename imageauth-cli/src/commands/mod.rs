//! Command implementations for the ImageAuth CLI.

pub mod check;
pub mod compare;
pub mod fingerprint;
pub mod register;
pub mod verify;
