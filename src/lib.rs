pub mod camera;
pub mod config;
pub mod double_sphere;
pub mod frame;
pub mod image;
pub mod landmark;
pub mod my_types;
pub mod optical_flow;
pub mod pinhole;
pub mod pyramid;
pub mod simulation;
pub mod tracker;
