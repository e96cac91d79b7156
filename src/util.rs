pub mod poll;
pub mod provider;
pub mod runtime;
