pub mod cache;
pub mod config;
pub mod dashboard;
pub mod events;
pub mod model;
pub mod pipeline;
pub mod sources;
pub mod summarizer;
