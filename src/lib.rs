//! Tarjama - Arabic to English Translation
//!
//! A Rust implementation of an Arabic to English translator backed by a
//! locally cached Marian NMT model: artifacts are downloaded and validated
//! once, then served through a reusable inference session.

pub mod acquire;
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
