pub mod ai;
pub mod video;
