pub mod common;
pub mod graph;
pub mod keygen;
pub mod plan;
pub mod shade;
