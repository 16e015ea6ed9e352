pub mod base;
pub mod registry;
pub mod rpc;
pub mod stdio;

#[cfg(test)]
pub mod mock;
