pub mod item;
pub mod module;
pub mod topic;

pub use item::*;
pub use module::*;
pub use topic::*;
