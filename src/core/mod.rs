pub mod commands;
pub mod ladder;
pub mod precision;
pub mod signal_parser;
pub mod tp_store;
pub mod trailing;
