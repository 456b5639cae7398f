//! Application services: the score pipeline and the ports it depends on.

pub mod error;
pub mod extract;
pub mod render;
pub mod score;
pub mod storage;
