pub mod builtin_resources;
pub mod frame_buffers;
pub mod raytracing_scene;
pub mod render_passes;
pub mod renderer;
pub mod settings;
pub mod upload_slots;
