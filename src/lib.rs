// src/lib.rs — Library root for Surfwatch

pub mod analysis;
pub mod api;
pub mod cli;
pub mod infra;
