//! Mixmatch Core - track recommendation engine for DJ libraries

pub mod config;
pub mod error;
pub mod features;
pub mod index;
pub mod music;
pub mod recommend;
pub mod store;

pub use error::RecommendError;
pub use recommend::{Recommendation, RecommendOptions, Recommender, Weights};
