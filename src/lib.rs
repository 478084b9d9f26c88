pub mod batch;
pub mod config;
pub mod context;
pub mod db;
pub mod errors;
pub mod index;
pub mod normalize;
pub mod overrides;
pub mod relinker;
pub mod resolver;
pub mod synthetic;
pub mod types;
pub mod validate;
