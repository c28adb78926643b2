//! Core pipeline orchestration and domain logic for DepoIndex.
//!
//! This crate ties together transcript parsing, clustering, LLM enrichment,
//! and run assembly into the end-to-end `analyze` workflow.

pub mod assembler;
pub mod enrichment;
pub mod pipeline;
pub mod toc;
