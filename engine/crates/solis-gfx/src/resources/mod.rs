pub mod buffer;
pub mod framebuffer;
pub mod image;
pub mod mesh_data_store;
pub mod staging_pool;
pub mod vertex;
