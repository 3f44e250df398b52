use anyhow::Context;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use solis_crate_tools::init_log::init_log;
use solis_crate_tools::resource::SolisPath;
use solis_gfx::render_device::RenderDeviceWindow;
use solis_render_interface::frame_counter::FrameCounter;
use solis_render_interface::registry::{SceneRegistry, SynchronizedResource};
use solis_render_interface::world::World;
use solis_renderer::renderer::Renderer;
use solis_renderer::settings::RendererSettings;
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{Key, NamedKey};
use winit::window::Window;
use winit::{application::ApplicationHandler, event::WindowEvent, event_loop::ActiveEventLoop, window::WindowId};

use crate::demo_scene::{self, DemoScene};

/// 0 表示不限制帧率
const FRAME_LIMIT: f32 = 0.0;

pub fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!("{}", info);
}

pub struct WinitApp {
    settings: RendererSettings,
    registry: SynchronizedResource<SceneRegistry>,
    world: World,
    frame_counter: FrameCounter,

    renderer: Option<Renderer>,
    scene: Option<DemoScene>,
    capturing: bool,

    window: Option<Window>,
}
// 总的 main 函数
impl WinitApp {
    /// 整个程序的入口
    pub fn run() -> anyhow::Result<()> {
        Self::init_env();

        let settings = RendererSettings::load(&SolisPath::settings_path());
        let event_loop = winit::event_loop::EventLoop::new().context("creating the event loop")?;

        let mut app = Self {
            frame_counter: FrameCounter::new(0, settings.num_frames as usize, FRAME_LIMIT),
            settings,
            registry: SynchronizedResource::new(SceneRegistry::new()),
            world: demo_scene::demo_world(),
            renderer: None,
            scene: None,
            capturing: false,
            window: None,
        };

        event_loop.run_app(&mut app).context("running the event loop")?;

        log::info!("end run.");

        app.destroy();
        Ok(())
    }

    fn init_env() {
        std::panic::set_hook(Box::new(panic_handler));

        init_log();

        tracy_client::Client::start();
        tracy_client::set_thread_name!("RenderThread");
    }
}
// new & init
impl WinitApp {
    /// 在 window 创建之后调用，初始化 Renderer 和场景
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window = event_loop
            .create_window(
                Window::default_attributes()
                    .with_title("Solis")
                    .with_inner_size(winit::dpi::LogicalSize::new(1200.0, 800.0)),
            )
            .context("creating the window")?;

        let size = window.inner_size();
        let render_window = RenderDeviceWindow {
            raw_display_handle: window.display_handle().context("getting the display handle")?.as_raw(),
            raw_window_handle: window.window_handle().context("getting the window handle")?.as_raw(),
            physical_extent: vk::Extent2D {
                width: size.width,
                height: size.height,
            },
        };

        let mut renderer = Renderer::new(&render_window, self.settings.clone());
        let scene = {
            let mut registry = self.registry.lock();
            DemoScene::new(&mut renderer, &mut registry, &self.world, (size.width, size.height))
        };

        self.renderer = Some(renderer);
        self.scene = Some(scene);
        self.window = Some(window);
        Ok(())
    }
}
// destroy
impl WinitApp {
    fn destroy(mut self) {
        self.scene = None;
        if let Some(renderer) = self.renderer.take() {
            renderer.destroy();
        }
        self.window = None;
    }
}
// update
impl WinitApp {
    fn update(&mut self) {
        let _span = tracy_client::span!("WinitApp::update");
        let (Some(renderer), Some(scene)) = (self.renderer.as_mut(), self.scene.as_mut()) else {
            return;
        };
        if !self.frame_counter.should_render() {
            return;
        }
        self.frame_counter.next_frame();

        {
            let mut registry = self.registry.lock();
            scene.update(&mut registry, self.frame_counter.delta_time().as_secs_f32());
        }

        renderer.begin_frame(self.frame_counter.frame_id());
        renderer.render_all(&self.registry, &self.world);
        renderer.end_frame();
    }

    fn resize(&mut self, width: u32, height: u32) {
        let (Some(renderer), Some(scene)) = (self.renderer.as_mut(), self.scene.as_mut()) else {
            return;
        };
        log::info!("window resized to {}x{}", width, height);
        renderer.resize(width, height);
        scene.resize(&mut self.registry.lock(), width, height);
    }

    /// F12 开始或结束一次图形调试工具的捕获
    fn toggle_capture(&mut self) {
        let Some(renderer) = self.renderer.as_ref() else {
            return;
        };
        if self.capturing {
            renderer.end_device_capture();
            log::info!("capture ended");
        } else {
            renderer.begin_device_capture();
            log::info!("capture started");
        }
        self.capturing = !self.capturing;
    }
}
// 各种 winit 的事件处理
impl ApplicationHandler for WinitApp {
    // 建议在这里创建 window 和 Renderer
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        log::info!("winit event: resumed");

        if let Err(e) = self.init_after_window(event_loop) {
            log::error!("{:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.resize(size.width, size.height);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::F12),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                self.toggle_capture();
            }
            WindowEvent::RedrawRequested => {
                self.update();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
    }
}
