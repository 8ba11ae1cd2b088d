pub mod zone_record;
