pub mod availability;
pub mod device;
pub mod light;
pub mod models;
