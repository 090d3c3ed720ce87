#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod config;
pub mod frequency;
pub mod kernel;
pub mod normalize;
pub mod optimize;
pub mod pipeline;
pub mod report;
pub mod types;
