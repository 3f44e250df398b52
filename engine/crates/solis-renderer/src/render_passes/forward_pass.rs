use ash::vk;
use solis_crate_tools::resource::load_shader;
use solis_gfx::commands::barrier::Transition;
use solis_gfx::commands::command_list::RenderCommandList;
use solis_gfx::commands::resource_state::ResourceState;
use solis_gfx::pipelines::graphics_pipeline::{GfxRenderPipelineState, RenderPipelineStateCreateInfo};
use solis_gfx::render_device::RenderDevice;
use solis_gfx::resources::framebuffer::{AttachmentAccess, Framebuffer, RenderPassAccess};
use solis_gfx::resources::image::{ImageCreateInfo, ImageFormat, ImageUsage};
use solis_render_interface::handles::TextureHandle;
use solis_render_interface::registry::RenderRegistry;
use solis_render_interface::world::World;

use crate::render_passes::PassContext;
use crate::renderer::Renderer;

pub const SCENE_COLOR_TARGET_NAME: &str = "Scene color target";
pub const SCENE_DEPTH_TARGET_NAME: &str = "Scene depth target";

/// 光栅化所有的静态 mesh
pub struct ForwardPass {
    pipeline: Option<GfxRenderPipelineState>,

    color_target: TextureHandle,
    depth_target: TextureHandle,
    framebuffer: Framebuffer,

    /// 上一帧结束时 target 被转换为 ShaderResource
    targets_readable: bool,
}

// new & init
impl ForwardPass {
    pub fn new(renderer: &mut Renderer, width: u32, height: u32) -> Self {
        let _span = tracy_client::span!("ForwardPass::new");

        let color_target = renderer.create_image(&ImageCreateInfo::new(
            SCENE_COLOR_TARGET_NAME,
            ImageUsage::RenderTarget,
            ImageFormat::Rgba32F,
            width,
            height,
        ));
        let depth_target = renderer.create_image(&ImageCreateInfo::new(
            SCENE_DEPTH_TARGET_NAME,
            ImageUsage::DepthStencil,
            ImageFormat::Depth32,
            width,
            height,
        ));
        let framebuffer = renderer.create_framebuffer(&[color_target], Some(depth_target))
            .unwrap_or_else(|| panic!("Could not create the forward pass framebuffer"));

        let pipeline = renderer.get_render_device().create_render_pipeline_state(
            RenderPipelineStateCreateInfo::new("Standard material pipeline")
                .vertex_shader(load_shader("standard.vertex"))
                .pixel_shader(load_shader("standard.pixel"))
                .attach_info(vec![ImageFormat::Rgba32F.vk_format()], Some(ImageFormat::Depth32.vk_format()))
                .cull_mode(vk::CullModeFlags::BACK, vk::FrontFace::CLOCKWISE)
                .depth_test(Some(vk::CompareOp::GREATER), true),
        );
        if pipeline.is_none() {
            log::error!("Could not create the standard material pipeline, the forward pass will only clear");
        }

        Self {
            pipeline,
            color_target,
            depth_target,
            framebuffer,
            targets_readable: false,
        }
    }
}

// getters
impl ForwardPass {
    #[inline]
    pub fn color_target(&self) -> TextureHandle {
        self.color_target
    }

    #[inline]
    pub fn depth_target(&self) -> TextureHandle {
        self.depth_target
    }
}

// update
impl ForwardPass {
    pub fn render(
        &mut self,
        ctx: &mut PassContext,
        commands: &mut RenderCommandList,
        registry: &dyn RenderRegistry,
        frame_idx: usize,
        _world: &World,
    ) {
        let _span = tracy_client::span!("ForwardPass::render");
        let (Some(color), Some(depth)) = (ctx.images.get(self.color_target), ctx.images.get(self.depth_target)) else {
            log::error!("Forward pass render targets are missing");
            return;
        };

        if self.targets_readable {
            commands.resource_barrier(&[
                Transition::image(color, ResourceState::ShaderResource, ResourceState::RenderTarget),
                Transition::image(depth, ResourceState::ShaderResource, ResourceState::DepthWrite),
            ]);
        }

        commands.begin_render_pass(
            &self.framebuffer,
            RenderPassAccess {
                color_load: AttachmentAccess::Clear,
                depth_load: AttachmentAccess::Clear,
            },
        );

        if let Some(pipeline) = &self.pipeline {
            commands.set_pipeline_state(pipeline);
            commands.bind_render_resources(&ctx.global_resources.build());
            commands.bind_mesh_data(ctx.mesh_store);
            commands.set_camera_index(0);

            let mut num_draws = 0;
            for (transform, renderable) in registry.static_meshes() {
                let model_matrix_index = ctx.model_matrices.add(transform, frame_idx);
                commands.set_material_index(renderable.material.index);
                commands.set_model_matrix_index(model_matrix_index);
                commands.draw(renderable.mesh.num_indices, renderable.mesh.first_index, 1);
                num_draws += 1;
            }
            log::trace!("Forward pass recorded {} draws", num_draws);
        }

        commands.end_render_pass();

        // 供后续 pass 采样
        commands.resource_barrier(&[
            Transition::image(color, ResourceState::RenderTarget, ResourceState::ShaderResource),
            Transition::image(depth, ResourceState::DepthWrite, ResourceState::ShaderResource),
        ]);
        self.targets_readable = true;
    }
}

// destroy
impl ForwardPass {
    pub fn destroy(self, device: &mut RenderDevice) {
        device.destroy_framebuffer(self.framebuffer);
    }
}
