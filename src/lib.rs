#![warn(
    clippy::all,
    // clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    // clippy::unwrap_used
)]

pub mod calendar;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod logger;
pub mod store;

pub use engine::{Engine, Settings};
pub use error::{Error, Result};
