#![allow(dead_code)]

pub mod fixtures;
pub mod stages;

pub use fixtures::*;
pub use stages::*;
