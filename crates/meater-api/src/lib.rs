// meater-api: Async Rust client for the MEATER cloud public API

pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use client::{DEFAULT_BASE_URL, MeaterClient};
pub use error::Error;
pub use models::{
    ApiResponse, Cook, CookTemperature, CookTime, Device, DevicesData, LoginData,
    ProbeTemperature,
};
pub use transport::TransportConfig;
