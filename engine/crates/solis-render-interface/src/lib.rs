//! 渲染器与场景之间的边界
//!
//! 这里的类型不依赖具体的图形 API：
//! - handle 以及写入 GPU buffer 的数据结构
//! - 场景组件以及实体注册表
//! - 材质数据的字节 arena，纹理的注册表

pub mod components;
pub mod frame_counter;
pub mod gpu_data;
pub mod handles;
pub mod image_registry;
pub mod material_arena;
pub mod registry;
pub mod world;
