//! # RTS AI Development Tools
//!
//! Command-line tools for working on the AI machines:
//! - Tuning file validation
//! - Transition table dumps

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod topology;
pub mod validate;
