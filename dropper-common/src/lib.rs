pub mod capabilities;
pub mod config;
pub mod error;
pub mod launcher;
pub mod pipeline;
pub mod util;
