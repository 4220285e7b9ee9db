pub mod aggregator;
pub mod config;
pub mod error;
pub mod normalize;
pub mod observability;
pub mod protocol;
pub mod seeder;
pub mod stream;
pub mod telemetry;
