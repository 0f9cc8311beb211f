pub mod db;
pub mod settlementdb;
