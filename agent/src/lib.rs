pub mod collectors;
pub mod config;
pub mod logging;
pub mod point;
pub mod sampler;
pub mod scheduler;
pub mod transport;
