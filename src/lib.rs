//! Natours application library
//!
//! Domain modules and helpers shared by the server binary and the CLI.

pub mod modules;
pub mod utils;

pub use modules::register_all;
pub use modules::tours::{service::TourService, ToursModule};
