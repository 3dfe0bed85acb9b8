pub mod memory;
pub mod sqlite;

mod migrations;
