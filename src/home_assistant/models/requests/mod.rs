pub mod light_command;
