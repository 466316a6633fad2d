pub mod ast;
pub mod config;
pub mod db;
pub mod mapping;
pub mod translation;
