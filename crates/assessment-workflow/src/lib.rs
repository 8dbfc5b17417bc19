//! Pillar-based compliance assessments: answer drafting and submission, independent
//! auditor review, and weighted scoring with a star rating.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
