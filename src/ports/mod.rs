pub mod bar_repository;
pub mod config_port;
pub mod report_port;
