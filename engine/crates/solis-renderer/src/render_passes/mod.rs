//! 按顺序执行的 render pass 链，后一个 pass 读取前一个 pass 的输出

pub mod denoiser_pass;
pub mod forward_pass;
pub mod ui_pass;

use solis_gfx::commands::command_list::RenderCommandList;
use solis_gfx::descriptors::bind_group::BindGroupBuilder;
use solis_gfx::render_device::RenderDevice;
use solis_gfx::resources::image::GfxImage;
use solis_gfx::resources::mesh_data_store::MeshDataStore;
use solis_render_interface::handles::TextureHandle;
use solis_render_interface::image_registry::ImageRegistry;
use solis_render_interface::registry::RenderRegistry;
use solis_render_interface::world::World;

use crate::frame_buffers::ModelMatrixBuffers;
use crate::render_passes::denoiser_pass::DenoiserPass;
use crate::render_passes::forward_pass::ForwardPass;
use crate::render_passes::ui_pass::UiPass;

/// pass 在录制期间可以访问的渲染器状态
pub struct PassContext<'a> {
    pub device: &'a RenderDevice,
    pub images: &'a ImageRegistry<GfxImage>,
    pub mesh_store: &'a MeshDataStore,
    pub model_matrices: &'a ModelMatrixBuffers,
    /// 已经绑定了本帧全局资源的 builder，pass 可以 clone 之后覆盖其中的条目
    pub global_resources: &'a BindGroupBuilder,
    /// 上一个 pass 的输出
    pub previous_output: Option<TextureHandle>,
}

pub enum RenderPass {
    Forward(ForwardPass),
    Denoiser(DenoiserPass),
    Ui(UiPass),
}

impl RenderPass {
    pub fn render(
        &mut self,
        ctx: &mut PassContext,
        commands: &mut RenderCommandList,
        registry: &dyn RenderRegistry,
        frame_idx: usize,
        world: &World,
    ) {
        match self {
            Self::Forward(pass) => pass.render(ctx, commands, registry, frame_idx, world),
            Self::Denoiser(pass) => pass.render(ctx, commands, registry, frame_idx, world),
            Self::Ui(pass) => pass.render(ctx, commands, registry, frame_idx, world),
        }
    }

    pub fn output_image(&self) -> Option<TextureHandle> {
        match self {
            Self::Forward(pass) => Some(pass.color_target()),
            Self::Denoiser(pass) => Some(pass.get_output_image()),
            Self::Ui(_) => None,
        }
    }

    /// pass 创建的 render target
    pub fn owned_images(&self) -> Vec<TextureHandle> {
        match self {
            Self::Forward(pass) => vec![pass.color_target(), pass.depth_target()],
            Self::Denoiser(pass) => vec![pass.accumulation_target(), pass.get_output_image()],
            Self::Ui(_) => Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Forward(_) => "Forward",
            Self::Denoiser(_) => "Denoiser",
            Self::Ui(_) => "UI",
        }
    }

    /// 图像由渲染器的注册表管理，这里只释放 framebuffer
    pub fn destroy(self, device: &mut RenderDevice) {
        match self {
            Self::Forward(pass) => pass.destroy(device),
            Self::Denoiser(pass) => pass.destroy(device),
            Self::Ui(pass) => pass.destroy(),
        }
    }
}

#[derive(Default)]
pub struct RenderPasses {
    passes: Vec<RenderPass>,
}

// new & init
impl RenderPasses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pass: RenderPass) {
        log::info!("Adding render pass {}", pass.name());
        self.passes.push(pass);
    }
}

// getters
impl RenderPasses {
    #[inline]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderPass> {
        self.passes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RenderPass> {
        self.passes.iter_mut()
    }

    #[inline]
    pub fn into_passes(self) -> Vec<RenderPass> {
        self.passes
    }

    /// 最后一个有输出的 pass 的输出
    pub fn final_output(&self) -> Option<TextureHandle> {
        self.passes.iter().rev().find_map(RenderPass::output_image)
    }
}

// update
impl RenderPasses {
    pub fn render_all(
        &mut self,
        ctx: &mut PassContext,
        commands: &mut RenderCommandList,
        registry: &dyn RenderRegistry,
        frame_idx: usize,
        world: &World,
    ) {
        let _span = tracy_client::span!("RenderPasses::render_all");
        ctx.previous_output = None;
        for pass in &mut self.passes {
            commands.begin_label(pass.name());
            pass.render(ctx, commands, registry, frame_idx, world);
            commands.end_label();

            if let Some(output) = pass.output_image() {
                ctx.previous_output = Some(output);
            }
        }
    }
}

// destroy
impl RenderPasses {
    pub fn destroy(self, device: &mut RenderDevice) {
        self.passes.into_iter().for_each(|pass| pass.destroy(device));
    }
}
