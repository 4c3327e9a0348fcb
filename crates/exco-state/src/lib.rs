//! # exco-state — Lifecycle Rules
//!
//! Pure state-machine and validity logic, shared by the persistence layer
//! (which enforces transitions inside transactions) and the lifecycle
//! controller (which authorizes them).
//!
//! - [`project`]: the eight-state project machine. States are loaded from
//!   database rows, so the machine is runtime-checked: an enum with an
//!   explicit transition table and [`project::validate_transition`].
//! - [`moratorium`]: the bounded-duration rule for no-dig windows
//!   (`valid_from <= valid_to <= valid_from + 5 years`, add-year
//!   arithmetic).

pub mod moratorium;
pub mod project;

pub use moratorium::{max_valid_to, validate_window};
pub use project::{validate_transition, ProjectState, TransitionError};
