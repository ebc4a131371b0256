pub mod context;
pub mod mesh;
