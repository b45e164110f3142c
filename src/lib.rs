pub mod cluster;
pub mod constants;
pub mod controller;
pub mod machinery;
pub mod resolver;
pub mod utils;

#[cfg(test)]
mod testing;
