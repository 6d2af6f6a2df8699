//! Domain types and SQL access for Starlink usage logs.

pub mod db;
pub mod domain;
