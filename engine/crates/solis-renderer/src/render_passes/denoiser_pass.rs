use ash::vk;
use solis_crate_tools::resource::load_shader;
use solis_gfx::commands::barrier::Transition;
use solis_gfx::commands::command_list::RenderCommandList;
use solis_gfx::commands::resource_state::ResourceState;
use solis_gfx::pipelines::graphics_pipeline::{GfxRenderPipelineState, RenderPipelineStateCreateInfo};
use solis_gfx::pipelines::pipeline_layout::MATERIAL_BUFFER_ROOT_DESCRIPTOR;
use solis_gfx::render_device::RenderDevice;
use solis_gfx::resources::framebuffer::{AttachmentAccess, Framebuffer, RenderPassAccess};
use solis_gfx::resources::image::{ImageCreateInfo, ImageFormat, ImageUsage};
use solis_render_interface::gpu_data::AccumulationMaterial;
use solis_render_interface::handles::TextureHandle;
use solis_render_interface::registry::RenderRegistry;
use solis_render_interface::world::World;

use crate::frame_buffers::PerFrameBuffers;
use crate::render_passes::PassContext;
use crate::render_passes::forward_pass::ForwardPass;
use crate::renderer::Renderer;

pub const ACCUMULATION_TARGET_NAME: &str = "Accumulation target";
pub const DENOISED_TARGET_NAME: &str = "Denoised scene";

/// 将当前帧与历史累积结果混合
///
/// 混合的结果再拷贝回累积纹理，作为下一帧的历史
pub struct DenoiserPass {
    pipeline: Option<GfxRenderPipelineState>,

    accumulation_target: TextureHandle,
    denoised_target: TextureHandle,
    framebuffer: Framebuffer,

    material: AccumulationMaterial,
    material_buffers: PerFrameBuffers,

    /// 第一帧时累积纹理仍然处于初始状态
    accumulation_in_copy_dest: bool,
}

// new & init
impl DenoiserPass {
    pub fn new(renderer: &mut Renderer, width: u32, height: u32, forward_pass: &ForwardPass) -> Self {
        let _span = tracy_client::span!("DenoiserPass::new");

        let accumulation_target = renderer.create_image(&ImageCreateInfo::new(
            ACCUMULATION_TARGET_NAME,
            ImageUsage::SampledImage,
            ImageFormat::Rgba32F,
            width,
            height,
        ));
        let denoised_target = renderer.create_image(&ImageCreateInfo::new(
            DENOISED_TARGET_NAME,
            ImageUsage::RenderTarget,
            ImageFormat::Rgba32F,
            width,
            height,
        ));
        let framebuffer = renderer.create_framebuffer(&[denoised_target], None)
            .unwrap_or_else(|| panic!("Could not create the denoiser pass framebuffer"));

        let device = renderer.get_render_device();
        let pipeline = device.create_render_pipeline_state(
            RenderPipelineStateCreateInfo::new("Raytracing accumulation pipeline")
                .vertex_shader(load_shader("fullscreen.vertex"))
                .pixel_shader(load_shader("raytracing_accumulation.pixel"))
                .without_vertex_input()
                .attach_info(vec![ImageFormat::Rgba32F.vk_format()], None)
                .cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
                .depth_test(None, false),
        );
        if pipeline.is_none() {
            log::error!("Could not create the accumulation pipeline, the denoiser pass will only copy");
        }

        let material_buffers = PerFrameBuffers::new(
            device,
            "denoiser-material",
            size_of::<AccumulationMaterial>() as vk::DeviceSize,
        )
        .unwrap_or_else(|| panic!("Could not create the denoiser material buffers"));

        Self {
            pipeline,
            accumulation_target,
            denoised_target,
            framebuffer,
            material: AccumulationMaterial {
                accumulation_texture: accumulation_target,
                scene_output_texture: forward_pass.color_target(),
                scene_depth_texture: forward_pass.depth_target(),
            },
            material_buffers,
            accumulation_in_copy_dest: false,
        }
    }
}

// getters
impl DenoiserPass {
    #[inline]
    pub fn get_output_image(&self) -> TextureHandle {
        self.denoised_target
    }

    #[inline]
    pub fn accumulation_target(&self) -> TextureHandle {
        self.accumulation_target
    }

    #[inline]
    pub fn material(&self) -> &AccumulationMaterial {
        &self.material
    }
}

// update
impl DenoiserPass {
    pub fn render(
        &mut self,
        ctx: &mut PassContext,
        commands: &mut RenderCommandList,
        _registry: &dyn RenderRegistry,
        frame_idx: usize,
        _world: &World,
    ) {
        let _span = tracy_client::span!("DenoiserPass::render");
        let (Some(accumulation), Some(denoised)) =
            (ctx.images.get(self.accumulation_target), ctx.images.get(self.denoised_target))
        else {
            log::error!("Denoiser pass render targets are missing");
            return;
        };

        // 上一个 pass 的输出作为本帧的场景颜色
        if let Some(scene_output) = ctx.previous_output {
            self.material.scene_output_texture = scene_output;
        }
        self.material_buffers.write_pod(frame_idx, std::slice::from_ref(&self.material));

        if self.accumulation_in_copy_dest {
            commands.resource_barrier(&[Transition::image(
                accumulation,
                ResourceState::CopyDest,
                ResourceState::ShaderResource,
            )]);
        }

        commands.begin_render_pass(
            &self.framebuffer,
            RenderPassAccess {
                color_load: AttachmentAccess::Discard,
                depth_load: AttachmentAccess::Preserve,
            },
        );
        if let Some(pipeline) = &self.pipeline {
            commands.set_pipeline_state(pipeline);
            let mut resources = ctx.global_resources.clone();
            resources.set_buffer(MATERIAL_BUFFER_ROOT_DESCRIPTOR, self.material_buffers.get(frame_idx));
            commands.bind_render_resources(&resources.build());
            commands.set_material_index(0);
            commands.draw_vertices(3);
        }
        commands.end_render_pass();

        commands.resource_barrier(&[
            Transition::image(accumulation, ResourceState::ShaderResource, ResourceState::CopyDest),
            Transition::image(denoised, ResourceState::RenderTarget, ResourceState::CopySource),
        ]);
        commands.copy_image(denoised, accumulation);
        commands.resource_barrier(&[Transition::image(
            denoised,
            ResourceState::CopySource,
            ResourceState::RenderTarget,
        )]);
        self.accumulation_in_copy_dest = true;
    }
}

// destroy
impl DenoiserPass {
    pub fn destroy(self, device: &mut RenderDevice) {
        device.destroy_framebuffer(self.framebuffer);
    }
}
