pub mod alarm;
pub mod config;
pub mod control;
pub mod logging;
pub mod models;
pub mod network;
pub mod provisioning;
pub mod report;
pub mod sampling;
pub mod sensors;
pub mod time_utils;

pub use config::{Config, Profile};
pub use control::ControlLoop;
pub use models::Reading;
