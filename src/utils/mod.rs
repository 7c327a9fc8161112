pub mod paths;
pub mod size;
