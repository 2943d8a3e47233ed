pub mod association;
pub mod cluster;
pub mod config;
pub mod dataset;
pub mod depth_map;
pub mod depth_model;
pub mod detector;
pub mod distance;
pub mod error;
pub mod feature;
pub mod frame;
pub mod ground_plane;
pub mod image;
pub mod math;
pub mod motion;
pub mod my_types;
pub mod optical_flow;
pub mod pipeline;
pub mod pixel_ratio;
pub mod pyramid;
pub mod speed;
pub mod track;
pub mod tracker;
