#![deny(dead_code)]
#![deny(unused_imports)]

pub mod bootstrap;
pub mod config;
pub mod cox;
pub mod estimate;
pub mod faer_ndarray;
pub mod io;
pub mod mediator;
pub mod pipeline;
pub mod resample;
pub mod sampler;
pub mod seeding;
pub mod survival;
pub mod types;

#[cfg(test)]
pub mod test_fixtures;
