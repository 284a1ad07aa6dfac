pub mod config;
pub mod middleware;
pub mod normalize;
pub mod proxy;
pub mod reconstruct;
pub mod sink;
pub mod tokens;
pub mod types;
