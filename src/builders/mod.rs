//! Builders to construct managers from configuration.

pub mod manager_builder;

pub use manager_builder::TaskManagerBuilder;
