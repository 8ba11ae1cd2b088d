pub mod ha_processor;
pub mod zones_processor;
