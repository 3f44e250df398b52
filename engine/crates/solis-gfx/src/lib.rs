//! Vulkan RHI (Rendering Hardware Interface) 抽象层
//!
//! 提供设备、队列、命令列表、资源、描述符堆、bind group、管线以及帧同步的封装。
//! 所有对象都通过 [`render_device::RenderDevice`] 创建，依赖通过参数显式传入，不使用全局单例。

pub mod basic;
pub mod commands;
pub mod descriptors;
pub mod foundation;
pub mod pipelines;
pub mod raytracing;
pub mod render_device;
pub mod resources;
pub mod swapchain;
