pub mod crash;
pub mod factory;
