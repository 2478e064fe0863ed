//! Command implementations for the helldiver CLI.
//!
//! `run` and `resume` share the interactive loop in [`interactive`].

pub mod commit;
pub mod doctor;
pub mod interactive;
pub mod resume;
pub mod run;
