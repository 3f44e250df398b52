use ash::vk;
use solis_crate_tools::resource::load_shader;
use solis_gfx::commands::barrier::Transition;
use solis_gfx::commands::command_list::RenderCommandList;
use solis_gfx::commands::resource_state::ResourceState;
use solis_gfx::pipelines::graphics_pipeline::{GfxRenderPipelineState, RenderPipelineStateCreateInfo};
use solis_gfx::resources::framebuffer::{AttachmentAccess, Framebuffer, RenderPassAccess};
use solis_render_interface::registry::RenderRegistry;
use solis_render_interface::world::World;

use crate::render_passes::PassContext;
use crate::renderer::Renderer;

/// 在 backbuffer 的 render pass 内录制 UI 的绘制命令
pub type UiRenderer = Box<dyn FnMut(&mut RenderCommandList, &Framebuffer)>;

/// 将前一个 pass 的输出绘制到 backbuffer，再在其上绘制 UI
pub struct UiPass {
    pipeline: Option<GfxRenderPipelineState>,
    ui_renderer: Option<UiRenderer>,
}

// new & init
impl UiPass {
    pub fn new(renderer: &Renderer) -> Self {
        let _span = tracy_client::span!("UiPass::new");
        let device = renderer.get_render_device();
        let pipeline = device.create_render_pipeline_state(
            RenderPipelineStateCreateInfo::new("Backbuffer output pipeline")
                .vertex_shader(load_shader("fullscreen.vertex"))
                .pixel_shader(load_shader("backbuffer_output.pixel"))
                .without_vertex_input()
                .attach_info(vec![device.backbuffer_format()], None)
                .cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
                .depth_test(None, false),
        );
        if pipeline.is_none() {
            log::error!("Could not create the backbuffer output pipeline, the scene will not reach the window");
        }

        Self {
            pipeline,
            ui_renderer: None,
        }
    }
}

// tools
impl UiPass {
    #[inline]
    pub fn set_ui_renderer(&mut self, ui_renderer: Option<UiRenderer>) {
        self.ui_renderer = ui_renderer;
    }

    #[inline]
    pub fn take_ui_renderer(&mut self) -> Option<UiRenderer> {
        self.ui_renderer.take()
    }

    #[inline]
    pub fn has_ui_renderer(&self) -> bool {
        self.ui_renderer.is_some()
    }
}

// update
impl UiPass {
    pub fn render(
        &mut self,
        ctx: &mut PassContext,
        commands: &mut RenderCommandList,
        _registry: &dyn RenderRegistry,
        _frame_idx: usize,
        _world: &World,
    ) {
        let _span = tracy_client::span!("UiPass::render");
        let framebuffer = ctx.device.backbuffer_framebuffer();
        let scene_output = ctx.previous_output.and_then(|handle| ctx.images.get(handle).map(|image| (handle, image)));

        if let Some((_, image)) = scene_output {
            commands.resource_barrier(&[Transition::image(
                image,
                ResourceState::RenderTarget,
                ResourceState::ShaderResource,
            )]);
        }

        commands.begin_render_pass(
            framebuffer,
            RenderPassAccess {
                color_load: AttachmentAccess::Clear,
                depth_load: AttachmentAccess::Discard,
            },
        );

        match (&self.pipeline, scene_output) {
            (Some(pipeline), Some((handle, _))) => {
                commands.set_pipeline_state(pipeline);
                commands.bind_render_resources(&ctx.global_resources.build());
                // 输出纹理在纹理数组中的位置
                commands.set_material_index(handle.index);
                commands.draw_vertices(3);
            }
            (_, None) => log::warn!("UI pass has no scene output to present"),
            (None, _) => {}
        }

        if let Some(ui_renderer) = self.ui_renderer.as_mut() {
            let _span = tracy_client::span!("UiRenderer");
            ui_renderer(commands, framebuffer);
        }

        commands.end_render_pass();

        if let Some((_, image)) = scene_output {
            commands.resource_barrier(&[Transition::image(
                image,
                ResourceState::ShaderResource,
                ResourceState::RenderTarget,
            )]);
        }
    }
}

// destroy
impl UiPass {
    pub fn destroy(self) {
        // pipeline 在 drop 时销毁
    }
}
