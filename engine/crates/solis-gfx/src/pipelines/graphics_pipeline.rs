use std::convert::identity;
use std::sync::Arc;

use ash::vk;

use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;
use crate::pipelines::shader::GfxShaderModule;
use crate::resources::vertex::{GfxVertexLayout, StandardVertexLayout};

/// render pipeline 的 shader 入口
pub const SHADER_ENTRY_POINT: &std::ffi::CStr = c"main";

pub struct RenderPipelineStateCreateInfo {
    name: String,

    vertex_shader: Vec<u8>,
    pixel_shader: Option<Vec<u8>>,

    /// 全屏 pass 不需要顶点输入
    use_standard_vertex_layout: bool,

    /// dynamic render 需要的 framebuffer 信息
    color_attach_formats: Vec<vk::Format>,
    /// dynamic render 需要的 framebuffer 信息
    depth_attach_format: vk::Format,

    primitive_topology: vk::PrimitiveTopology,
    rasterize_state_info: vk::PipelineRasterizationStateCreateInfo<'static>,

    color_attach_blend_states: Vec<vk::PipelineColorBlendAttachmentState>,
    blend_info: vk::PipelineColorBlendStateCreateInfo<'static>,

    depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo<'static>,

    dynamic_states: Vec<vk::DynamicState>,
}
impl RenderPipelineStateCreateInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertex_shader: Vec::new(),
            pixel_shader: None,
            use_standard_vertex_layout: true,

            color_attach_formats: vec![],
            // format = undefined 表示不使用这个 attachment
            depth_attach_format: vk::Format::UNDEFINED,

            primitive_topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            rasterize_state_info: vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(vk::PolygonMode::FILL)
                .line_width(1.0)
                .cull_mode(vk::CullModeFlags::BACK)
                // viewport 翻转了 y 轴，顺时针为正面
                .front_face(vk::FrontFace::CLOCKWISE)
                .depth_bias_enable(false),

            color_attach_blend_states: vec![],
            blend_info: vk::PipelineColorBlendStateCreateInfo::default()
                .logic_op_enable(false)
                .blend_constants([0.0, 0.0, 0.0, 0.0]),

            depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(true)
                .depth_write_enable(true)
                // reversed-z
                .depth_compare_op(vk::CompareOp::GREATER)
                .depth_bounds_test_enable(false)
                .stencil_test_enable(false),
            dynamic_states: vec![
                vk::DynamicState::VIEWPORT,
                vk::DynamicState::SCISSOR,
                vk::DynamicState::PRIMITIVE_TOPOLOGY,
            ],
        }
    }
}
// builder
impl RenderPipelineStateCreateInfo {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// builder
    #[inline]
    pub fn vertex_shader(&mut self, bytecode: Vec<u8>) -> &mut Self {
        self.vertex_shader = bytecode;
        self
    }

    /// builder
    #[inline]
    pub fn pixel_shader(&mut self, bytecode: Vec<u8>) -> &mut Self {
        self.pixel_shader = Some(bytecode);
        self
    }

    /// 不使用 vertex buffer，顶点在 shader 中生成
    #[inline]
    pub fn without_vertex_input(&mut self) -> &mut Self {
        self.use_standard_vertex_layout = false;
        self
    }

    /// builder
    #[inline]
    pub fn attach_info(&mut self, color_attach_formats: Vec<vk::Format>, depth_format: Option<vk::Format>) -> &mut Self {
        // 每个 color attachment 默认不混合
        self.color_attach_blend_states = color_attach_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect();
        self.color_attach_formats = color_attach_formats;
        self.depth_attach_format = depth_format.unwrap_or(vk::Format::UNDEFINED);
        self
    }

    /// 为每个 color attachment 指定 blend 操作
    #[inline]
    pub fn color_blend(
        &mut self,
        states: Vec<vk::PipelineColorBlendAttachmentState>,
        blend_constants: [f32; 4],
    ) -> &mut Self {
        self.color_attach_blend_states = states;
        self.blend_info.blend_constants = blend_constants;
        self.blend_info.logic_op_enable = vk::FALSE;
        self
    }

    #[inline]
    pub fn cull_mode(&mut self, mode: vk::CullModeFlags, front_face: vk::FrontFace) -> &mut Self {
        self.rasterize_state_info.cull_mode = mode;
        self.rasterize_state_info.front_face = front_face;
        self
    }

    #[inline]
    pub fn depth_test(&mut self, depth_test_op: Option<vk::CompareOp>, depth_write: bool) -> &mut Self {
        self.depth_stencil_info.depth_test_enable = depth_test_op.map_or(vk::FALSE, |_| vk::TRUE);
        self.depth_stencil_info.depth_compare_op = depth_test_op.map_or(vk::CompareOp::NEVER, identity);
        self.depth_stencil_info.depth_write_enable = if depth_write { vk::TRUE } else { vk::FALSE };
        self
    }
}

/// graphics pipeline，使用 RenderDevice 的标准 pipeline layout
pub struct GfxRenderPipelineState {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    name: String,

    device: Arc<GfxDevice>,
}
impl GfxRenderPipelineState {
    /// shader 字节码无效或者创建失败时返回 None
    pub fn new(
        device: Arc<GfxDevice>,
        layout: vk::PipelineLayout,
        create_info: &RenderPipelineStateCreateInfo,
    ) -> Option<Self> {
        let _span = tracy_client::span!("GfxRenderPipelineState::new");
        let name = create_info.name.as_str();

        let vertex_module =
            GfxShaderModule::from_bytes(device.clone(), &create_info.vertex_shader, &format!("{name}.vertex"))?;
        let pixel_module = match &create_info.pixel_shader {
            Some(bytecode) => match GfxShaderModule::from_bytes(device.clone(), bytecode, &format!("{name}.pixel")) {
                Some(module) => Some(module),
                None => {
                    vertex_module.destroy();
                    return None;
                }
            },
            None => None,
        };

        let mut shader_stages = vec![
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module.handle())
                .name(SHADER_ENTRY_POINT),
        ];
        if let Some(pixel_module) = &pixel_module {
            shader_stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(pixel_module.handle())
                    .name(SHADER_ENTRY_POINT),
            );
        }

        // dynamic rendering 需要的 framebuffer 信息
        let mut attach_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&create_info.color_attach_formats)
            .depth_attachment_format(create_info.depth_attach_format);

        // 顶点和 index
        let (vertex_bindings, vertex_attributes) = if create_info.use_standard_vertex_layout {
            (StandardVertexLayout::vertex_input_bindings(), StandardVertexLayout::vertex_input_attributes())
        } else {
            (vec![], vec![])
        };
        let vertex_input_state_info = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(create_info.primitive_topology)
            .primitive_restart_enable(false);

        // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
        let viewport_info = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };

        let msaa_info = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // 混合设置：需要为每个 color attachment 分别指定
        let color_blend_info = create_info.blend_info.attachments(&create_info.color_attach_blend_states);

        let dynamic_state_info =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&create_info.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&create_info.rasterize_state_info)
            .multisample_state(&msaa_info)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&create_info.depth_stencil_info)
            .layout(layout)
            .dynamic_state(&dynamic_state_info)
            .push_next(&mut attach_info);

        let created = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        };

        vertex_module.destroy();
        if let Some(pixel_module) = pixel_module {
            pixel_module.destroy();
        }

        let pipeline = match created {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                log::error!("Could not create render pipeline {}: {:?}", name, e);
                return None;
            }
        };

        let pipeline = Self {
            pipeline,
            layout,
            name: name.to_string(),
            device,
        };
        pipeline.device.set_debug_name(&pipeline, name);
        log::info!("Created render pipeline {}", name);
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
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn destroy(self) {
        // drop
    }
}
impl Drop for GfxRenderPipelineState {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}
impl DebugType for GfxRenderPipelineState {
    fn debug_type_name() -> &'static str {
        "GfxRenderPipelineState"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}
