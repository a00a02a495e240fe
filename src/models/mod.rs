pub mod image_entry;
pub mod mark;
pub mod move_plan;

pub use image_entry::*;
pub use mark::*;
pub use move_plan::*;
