pub mod memory;
pub mod zookeeper;
