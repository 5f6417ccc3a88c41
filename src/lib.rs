//! Gavel: verifier for competitive-programming problem packages
//!
//! Loads a problem package (statement, validators, test data, reference
//! submissions), checks that it conforms to the package format, and judges
//! every reference submission against the verdict its directory claims,
//! with time limits inferred from the accepted solutions.

pub mod attachments;
pub mod config;
pub mod generators;
pub mod problem;
pub mod report;
pub mod runner;
pub mod statement;
pub mod submissions;
pub mod testdata;
pub mod validators;
pub mod verdict;

pub use problem::{Part, Problem, VerifyOptions};
pub use report::{Bailout, LogLevel, Report};
pub use verdict::{SubmissionResult, Verdict};
