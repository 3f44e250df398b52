use std::sync::Arc;

use ash::vk;

use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;
use crate::pipelines::graphics_pipeline::SHADER_ENTRY_POINT;
use crate::pipelines::shader::GfxShaderModule;

pub struct GfxComputePipelineState {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,

    device: Arc<GfxDevice>,
}
impl GfxComputePipelineState {
    /// shader 字节码无效或者创建失败时返回 None
    pub fn new(
        device: Arc<GfxDevice>,
        layout: vk::PipelineLayout,
        compute_shader: &[u8],
        debug_name: &str,
    ) -> Option<Self> {
        let _span = tracy_client::span!("GfxComputePipelineState::new");

        let module = GfxShaderModule::from_bytes(device.clone(), compute_shader, debug_name)?;
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module.handle())
            .name(SHADER_ENTRY_POINT);
        let pipeline_info = vk::ComputePipelineCreateInfo::default().stage(stage).layout(layout);

        let created = unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        };
        module.destroy();

        let pipeline = match created {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                log::error!("Could not create compute pipeline {}: {:?}", debug_name, e);
                return None;
            }
        };

        let pipeline = Self {
            pipeline,
            layout,
            device,
        };
        pipeline.device.set_debug_name(&pipeline, debug_name);
        Some(pipeline)
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    #[inline]
    pub fn destroy(self) {
        // drop
    }
}
impl Drop for GfxComputePipelineState {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}
impl DebugType for GfxComputePipelineState {
    fn debug_type_name() -> &'static str {
        "GfxComputePipelineState"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}
