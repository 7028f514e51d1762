pub mod cli;
pub mod command;
pub mod config;
pub mod cursor;
pub mod event_loop;
pub mod expr;
pub mod listing;
pub mod log;
pub mod point;
pub mod table;
pub mod value;
pub mod var;
