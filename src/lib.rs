//! Room Decision Support
//!
//! Multi-criteria scoring, ranking and explanation for room-rental search
//! results, using min–max normalization and TOPSIS ideal-solution ranking.
//!
//! # Features
//!
//! - Benefit/cost aware normalization of price, area, distance, rating,
//!   amenity count and security score
//! - User-adjustable weights with ranking by closeness to the ideal solution
//! - Per-room explanations with an itemized score breakdown
//! - Staged flow with cached intermediate matrices for step-by-step display
//! - Optional remote decision-matrix service with local fallback
//! - `SQLite` persistence for the session cache
//!
//! # Quick Start
//!
//! ```bash
//! echo '{"rooms": [...], "weights": [1, 1, 1, 1, 1, 2]}' | ./room-dss
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   rooms    ┌──────────────────┐  X?  ┌────────────────┐
//! │ search / UI  │───────────▶│   StagedFlow     │─────▶│ remote scorer  │
//! │              │◀───────────│ X → R → V → rank │◀─────│ (local fallback)│
//! └──────────────┘  ranking   └────────┬─────────┘      └────────────────┘
//!                 explanations         │
//!                                      ▼
//!                               session cache (SQLite)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod flow;
pub mod metrics;
pub mod model;
pub mod provider;
pub mod scoring;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod test_utils;
