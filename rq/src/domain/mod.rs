//! Domain types shared by the scheduler and the CLI

mod priority;

pub use priority::Priority;
