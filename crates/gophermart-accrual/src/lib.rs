//! Background accrual: the HTTP client for the external accrual service and
//! the three-stage pipeline (discovery -> lookup -> apply) that feeds its
//! results back into storage.

pub mod client;
pub mod pipeline;

pub use client::{AccrualClient, AccrualClientConfig, AccrualError};
pub use pipeline::{AccrualLookup, AccrualPipeline, AccrualStore, PipelineConfig, PipelineHandle};
