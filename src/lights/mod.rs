pub mod command_store;
pub mod controller;
pub mod encoder;
pub mod presets;
pub mod reconciler;
pub mod zone;
pub mod zone_table;
