pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod model;
pub mod provider;
pub mod retention;
pub mod scheduler;
pub mod service;
pub mod translate;
pub mod translate_queue;
