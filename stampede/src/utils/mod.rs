pub mod os;
pub mod telemetry;
