//! Sentiment scoring pipeline.
//!
//! This module normalizes heterogeneous per-model sentiment outputs onto a
//! common 0-100 scale, combines them into per-post scores under a weight
//! configuration, and aggregates post collections into overall averages or
//! date-bucketed series.

pub mod aggregate;
pub mod combine;
pub mod normalize;
pub mod utility;
