pub mod constants;
pub mod dop;
pub mod ephemeris;
pub mod geometry;
pub mod pipeline;
pub mod skydop_errors;
pub mod telemetry;
pub mod time;
pub mod visibility;
