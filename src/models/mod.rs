pub mod engine;
pub mod generation;
pub mod size;

pub use engine::*;
pub use generation::*;
pub use size::*;
