#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::cast_precision_loss,
    clippy::return_self_not_must_use
)]

pub mod approval;
pub mod config;
pub mod dst;
pub mod engage;
pub mod error;
pub mod gateway;
pub mod generate;
pub mod guardrails;
pub mod persona;
pub mod score;
pub mod signals;
pub mod stage;
pub mod store;

pub use config::Config;
pub use engage::EngagementManager;
pub use error::{LureError, Result};
