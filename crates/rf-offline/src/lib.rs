//! RF-Offline: Offline adaptation and job scheduling
//!
//! Runs streaming, block-based analysis clients over whole buffers:
//! - Audio to audio with latency compensation
//! - Control-rate feature extraction
//! - Onset slicing into frame markers
//! - Background jobs with a FIFO queue, progress and cancellation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        JobScheduler                              │
//! │                                                                  │
//! │  [ParamSet] [ParamSet] ... → Job (private buffer copies)         │
//! │                               │                                  │
//! │                               ▼  worker thread                   │
//! │  ┌──────────────┐   ┌──────────────────┐   ┌─────────────────┐  │
//! │  │ BatchClient  │ → │ Adaptation       │ → │ AlgorithmClient │  │
//! │  │ (validation) │   │ Streaming/       │   │ (HPSS, onset,   │  │
//! │  │              │   │ Control/Slicing  │   │  stats, ...)    │  │
//! │  └──────────────┘   └──────────────────┘   └─────────────────┘  │
//! │                               │                                  │
//! │                               ▼  check_progress()                │
//! │               copy back to caller buffers on success             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rf_offline::{clients::HpssClient, JobScheduler, OfflineConfig, load_wav};
//!
//! let mut scheduler = JobScheduler::new(HpssClient::batch(), OfflineConfig::blocking());
//! let mut params = scheduler.default_params();
//! params.set_buffer("source", Some(load_wav("drums.wav")?.into_shared()))?;
//! params.set_buffer("harmonic", Some(harmonic.clone()))?;
//!
//! scheduler.enqueue(&params)?;
//! let result = scheduler.process();
//! ```

pub mod adaptation;
pub mod clients;
mod config;
mod context;
mod error;
mod job;
mod processors;
mod result;
mod scheduler;
mod spikes;
mod wav;
mod wrapper;

#[cfg(test)]
mod testing;

pub use config::*;
pub use context::*;
pub use error::*;
pub use job::*;
pub use processors::*;
pub use result::*;
pub use scheduler::*;
pub use spikes::*;
pub use wav::*;
pub use wrapper::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
