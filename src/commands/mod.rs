//! Subcommand implementations.
//!
//! Each command exposes a clap `Args` struct and an async entry point taking
//! the shared `System`, the working directory and the progress `Ui`.

pub mod deps;
pub mod doctor;
pub mod service;
pub mod start;
pub mod stop;

pub use deps::{execute_deps, DepsArgs};
pub use doctor::{execute_doctor, DoctorArgs};
pub use service::{execute_service, ServiceArgs};
pub use start::{execute_start, StartArgs};
pub use stop::{execute_stop, StopArgs};
