pub mod base;
pub mod configs;
pub mod openai;
pub mod stream;
pub mod utils;

#[cfg(test)]
pub mod mock;
