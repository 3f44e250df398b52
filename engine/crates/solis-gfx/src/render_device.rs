//! 渲染设备
//!
//! 持有 Vulkan 的全部核心对象，负责：
//! - 资源、command list、pipeline 的创建
//! - command list 的提交与回收（后台线程等待 fence）
//! - 帧的开始与结束（frame fence、swapchain acquire 与 present）

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use itertools::Itertools;

use crate::basic::color::LabelColor;
use crate::commands::barrier::Transition;
use crate::commands::command_list::{
    CommandList, CommandListType, ComputeCommandList, RenderCommandList, ResourceCommandList, RetiredCommandList,
};
use crate::commands::command_pool::GfxCommandPool;
use crate::commands::completion::InFlightSubmissions;
use crate::commands::fence::GfxFence;
use crate::commands::frame_sync::FrameFences;
use crate::commands::queue::GfxQueue;
use crate::commands::resource_state::ResourceState;
use crate::commands::semaphore::{GfxSemaphore, GfxTimelineSemaphore};
use crate::commands::submit_info::GfxSubmitInfo;
use crate::descriptors::bind_group::BindGroupBuilder;
use crate::descriptors::descriptor_allocator::DescriptorHandle;
use crate::descriptors::descriptor_heap::{GfxResourceHeap, GfxViewHeap};
use crate::foundation::debug_messenger::GfxDebugMessenger;
use crate::foundation::device::GfxDevice;
use crate::foundation::instance::GfxInstance;
use crate::foundation::mem_allocator::GfxMemAllocator;
use crate::foundation::physical_device::GfxPhysicalDevice;
use crate::pipelines::compute_pipeline::GfxComputePipelineState;
use crate::pipelines::graphics_pipeline::{GfxRenderPipelineState, RenderPipelineStateCreateInfo};
use crate::pipelines::pipeline_layout::{
    GfxPipelineLayout, standard_descriptor_table_descriptors, standard_descriptor_table_handles,
    standard_root_descriptors,
};
use crate::resources::buffer::{BufferCreateInfo, BufferUsage, GfxBuffer};
use crate::resources::framebuffer::{Framebuffer, validate_framebuffer_sizes};
use crate::resources::image::{GfxImage, ImageCreateInfo};
use crate::resources::staging_pool::StagingPool;
use crate::swapchain::render_swapchain::GfxRenderSwapchain;
use crate::swapchain::surface::GfxSurface;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PresentMode {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

impl PresentMode {
    #[inline]
    pub fn vk_present_mode(self) -> vk::PresentModeKHR {
        match self {
            Self::Fifo => vk::PresentModeKHR::FIFO,
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderDeviceSettings {
    /// frames in flight 的数量，同时也是请求的 swapchain image 数量
    pub num_frames: u32,
    pub enable_validation: bool,
    pub max_resource_descriptors: u32,
    pub max_render_target_views: u32,
    pub max_depth_stencil_views: u32,
    /// 后台线程单次等待 fence 的超时时间，超时之后重试
    pub fence_wait_timeout: Duration,
    pub present_mode: PresentMode,
}

impl Default for RenderDeviceSettings {
    fn default() -> Self {
        Self {
            num_frames: 3,
            enable_validation: cfg!(debug_assertions),
            max_resource_descriptors: 65536,
            max_render_target_views: 1024,
            max_depth_stencil_views: 32,
            fence_wait_timeout: Duration::from_secs(2),
            present_mode: PresentMode::Fifo,
        }
    }
}

/// 窗口相关的创建参数
pub struct RenderDeviceWindow {
    pub raw_display_handle: raw_window_handle::RawDisplayHandle,
    pub raw_window_handle: raw_window_handle::RawWindowHandle,
    pub physical_extent: vk::Extent2D,
}

/// 已经销毁 framebuffer 的 view，在 `num_frames` 帧之后才真正释放
struct PendingViewRelease {
    frame_count: u64,
    rtv_handles: Vec<DescriptorHandle>,
    dsv_handle: Option<DescriptorHandle>,
}

pub struct RenderDevice {
    settings: RenderDeviceSettings,

    entry: ash::Entry,
    instance: GfxInstance,
    debug_messenger: GfxDebugMessenger,
    pdevice: GfxPhysicalDevice,
    device: Arc<GfxDevice>,
    allocator: Arc<GfxMemAllocator>,

    gfx_queue: GfxQueue,
    /// 只在独立显卡上存在
    transfer_queue: Option<GfxQueue>,

    swapchain: GfxRenderSwapchain,
    swapchain_needs_recreate: bool,
    /// 每个 swapchain image 是否已经被 present 过，第一次使用时 layout 为 UNDEFINED
    backbuffer_presented: Vec<bool>,
    backbuffer_framebuffers: Vec<Framebuffer>,

    command_pools: HashMap<CommandListType, GfxCommandPool>,
    command_list_counter: u64,

    resource_heap: GfxResourceHeap,
    rtv_heap: GfxViewHeap,
    dsv_heap: GfxViewHeap,
    pending_view_releases: Vec<PendingViewRelease>,

    standard_layout: GfxPipelineLayout,

    in_flight: InFlightSubmissions<GfxFence, RetiredCommandList>,
    free_fences: Vec<GfxFence>,
    staging_pool: StagingPool<GfxBuffer>,

    /// 新创建的 image 需要从 UNDEFINED 转换到初始状态，在下一次提交之前统一执行
    pending_initial_transitions: Vec<Transition>,
    pending_buffer_destructions: Vec<GfxBuffer>,
    pending_image_destructions: Vec<GfxImage>,

    frame_fences: FrameFences<GfxTimelineSemaphore>,
    /// 每个 frame slot 一个，swapchain acquire 时 signal
    image_available_semaphores: Vec<GfxSemaphore>,
    /// 每个 swapchain image 一个，present 时 wait
    render_finished_semaphores: Vec<GfxSemaphore>,

    cur_frame_count: u64,
    cur_frame_idx: usize,
}

// new & init
impl RenderDevice {
    /// 初始化过程中任何一步失败都是致命错误
    pub fn new(app_name: &str, settings: RenderDeviceSettings, window: &RenderDeviceWindow) -> Self {
        let _span = tracy_client::span!("RenderDevice::new");
        log::info!("Initializing render device with {:?}", settings);

        let entry = unsafe { ash::Entry::load() }
            .unwrap_or_else(|e| panic!("Could not load the Vulkan library: {e}"));

        // 1. instance
        let surface_exts = ash_window::enumerate_required_extensions(window.raw_display_handle)
            .unwrap_or_else(|e| panic!("Could not query the surface extensions: {e:?}"));
        let instance = GfxInstance::new(&entry, app_name, surface_exts, settings.enable_validation);
        let debug_messenger = GfxDebugMessenger::new(&entry, instance.ash_instance());

        // 2. adapter
        let pdevice = GfxPhysicalDevice::select(instance.ash_instance());
        let is_uma = pdevice.info().is_uma();

        // 3. queue
        let transfer_family = if is_uma {
            None
        } else {
            if pdevice.transfer_queue_family.is_none() {
                log::warn!("Could not find a dedicated copy queue on adapter {}", pdevice.info().name);
            }
            pdevice.transfer_queue_family.clone()
        };
        let queue_priorities = [1.0_f32];
        let mut queue_create_infos = vec![
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(pdevice.gfx_queue_family().queue_family_index)
                .queue_priorities(&queue_priorities),
        ];
        if let Some(family) = &transfer_family {
            queue_create_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family.queue_family_index)
                    .queue_priorities(&queue_priorities),
            );
        }
        let device = Arc::new(GfxDevice::new(instance.ash_instance(), &pdevice, &queue_create_infos));

        // vma 需要 device，所以紧跟在 device 之后创建
        let allocator =
            Arc::new(GfxMemAllocator::new(instance.ash_instance(), pdevice.vk_handle(), &device));

        let gfx_queue = GfxQueue::new(device.clone(), pdevice.gfx_queue_family().clone(), 0, "gfx");
        let transfer_queue = transfer_family.map(|family| GfxQueue::new(device.clone(), family, 0, "copy"));

        // 4. swapchain
        let surface = GfxSurface::new(
            &entry,
            instance.ash_instance(),
            pdevice.vk_handle(),
            window.raw_display_handle,
            window.raw_window_handle,
        );
        if !surface.supports_present(gfx_queue.queue_family().queue_family_index) {
            panic!("The graphics queue of adapter {} can not present to the window", pdevice.info().name);
        }
        let swapchain = GfxRenderSwapchain::new(
            device.clone(),
            surface,
            settings.present_mode.vk_present_mode(),
            settings.num_frames,
            window.physical_extent,
        );

        // 5. command pools
        let gfx_family_index = gfx_queue.queue_family().queue_family_index;
        let command_pools = [
            (CommandListType::Render, "render"),
            (CommandListType::Compute, "compute"),
            (CommandListType::Resource, "resource"),
        ]
        .into_iter()
        .map(|(ty, name)| (ty, GfxCommandPool::new(device.clone(), gfx_family_index, name)))
        .collect::<HashMap<_, _>>();

        // 6. descriptor heaps
        let resource_heap = GfxResourceHeap::new(device.clone(), settings.max_resource_descriptors);
        let rtv_heap = GfxViewHeap::new(device.clone(), "render target views", settings.max_render_target_views);
        let dsv_heap = GfxViewHeap::new(device.clone(), "depth stencil views", settings.max_depth_stencil_views);

        // 9. pipeline layout
        let standard_layout = GfxPipelineLayout::new_standard(device.clone(), resource_heap.set_layout());

        let num_frames = settings.num_frames.max(1) as usize;
        let frame_fences = FrameFences::new(
            (0..num_frames)
                .map(|idx| GfxTimelineSemaphore::new(device.clone(), 0, &format!("frame-fence-{idx}")))
                .collect(),
            settings.fence_wait_timeout,
        );
        let image_available_semaphores = (0..num_frames)
            .map(|idx| GfxSemaphore::new(device.clone(), &format!("image-available-{idx}")))
            .collect_vec();

        // 10. completion worker
        let in_flight = InFlightSubmissions::new(settings.fence_wait_timeout);

        let mut render_device = Self {
            settings,
            entry,
            instance,
            debug_messenger,
            pdevice,
            device,
            allocator,
            gfx_queue,
            transfer_queue,
            swapchain,
            swapchain_needs_recreate: false,
            backbuffer_presented: vec![],
            backbuffer_framebuffers: vec![],
            command_pools,
            command_list_counter: 0,
            resource_heap,
            rtv_heap,
            dsv_heap,
            pending_view_releases: vec![],
            standard_layout,
            in_flight,
            free_fences: vec![],
            staging_pool: StagingPool::new(),
            pending_initial_transitions: vec![],
            pending_buffer_destructions: vec![],
            pending_image_destructions: vec![],
            frame_fences,
            image_available_semaphores,
            render_finished_semaphores: vec![],
            cur_frame_count: 0,
            cur_frame_idx: 0,
        };

        // 7. backbuffer 的 render target view
        render_device.create_backbuffer_framebuffers();
        log::info!("render device initialized");
        render_device
    }

    fn create_backbuffer_framebuffers(&mut self) {
        let format = self.swapchain.color_format();
        let extent = self.swapchain.extent();
        let images = self.swapchain.present_images().to_vec();

        self.backbuffer_framebuffers = images
            .iter()
            .enumerate()
            .map(|(idx, image)| {
                let view = self.create_view(*image, format, vk::ImageAspectFlags::COLOR, &format!("backbuffer-{idx}"));
                let handle = self.rtv_heap.insert(view);
                Framebuffer::new(vec![handle], vec![view], vec![format], None, extent.width, extent.height)
            })
            .collect();
        self.backbuffer_presented = vec![false; images.len()];
        self.render_finished_semaphores = (0..images.len())
            .map(|idx| GfxSemaphore::new(self.device.clone(), &format!("render-finished-{idx}")))
            .collect();
    }

    fn create_view(&self, image: vk::Image, format: vk::Format, aspect: vk::ImageAspectFlags, name: &str) -> vk::ImageView {
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = unsafe { self.device.create_image_view(&view_ci, None) }
            .unwrap_or_else(|e| panic!("Could not create view {name}: {e:?}"));
        self.device.set_object_debug_name(view, format!("ImageView::{name}"));
        view
    }
}

// getters
impl RenderDevice {
    #[inline]
    pub fn settings(&self) -> &RenderDeviceSettings {
        &self.settings
    }

    #[inline]
    pub fn gfx_device(&self) -> &Arc<GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn allocator(&self) -> &Arc<GfxMemAllocator> {
        &self.allocator
    }

    #[inline]
    pub fn acceleration_scratch_alignment(&self) -> u32 {
        self.pdevice.min_acceleration_scratch_alignment()
    }

    /// 当前的 frame slot
    #[inline]
    pub fn frame_idx(&self) -> usize {
        self.cur_frame_idx
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.cur_frame_count
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.frame_fences.num_slots()
    }

    #[inline]
    pub fn backbuffer_framebuffer(&self) -> &Framebuffer {
        &self.backbuffer_framebuffers[self.swapchain.current_image_index()]
    }

    #[inline]
    pub fn backbuffer_size(&self) -> (u32, u32) {
        let extent = self.swapchain.extent();
        (extent.width, extent.height)
    }

    #[inline]
    pub fn backbuffer_format(&self) -> vk::Format {
        self.swapchain.color_format()
    }

    #[inline]
    pub fn standard_pipeline_layout(&self) -> &GfxPipelineLayout {
        &self.standard_layout
    }

    #[inline]
    pub fn resource_heap(&self) -> &GfxResourceHeap {
        &self.resource_heap
    }

    #[inline]
    pub fn resource_heap_mut(&mut self) -> &mut GfxResourceHeap {
        &mut self.resource_heap
    }

    #[inline]
    pub fn is_uma(&self) -> bool {
        self.pdevice.info().is_uma()
    }

    #[inline]
    pub fn has_transfer_queue(&self) -> bool {
        self.transfer_queue.is_some()
    }

    #[inline]
    pub fn supports_raytracing(&self) -> bool {
        self.device.raytracing_enabled()
    }

    #[inline]
    pub fn validation_enabled(&self) -> bool {
        self.settings.enable_validation
    }

    #[inline]
    pub fn num_in_flight_command_lists(&self) -> usize {
        self.in_flight.len()
    }
}

// resources
impl RenderDevice {
    /// 失败时返回 None
    pub fn create_buffer(&self, create_info: &BufferCreateInfo) -> Option<GfxBuffer> {
        GfxBuffer::new(&self.device, self.allocator.clone(), create_info, None)
    }

    /// 失败时返回 None
    ///
    /// 初始状态的 transition 在下一个 command list 提交之前执行
    pub fn create_image(&mut self, create_info: &ImageCreateInfo) -> Option<GfxImage> {
        let image = GfxImage::new(self.device.clone(), self.allocator.clone(), create_info)?;
        self.pending_initial_transitions.push(Transition::image(
            &image,
            ResourceState::Undefined,
            image.initial_state(),
        ));
        Some(image)
    }

    /// 为 render target 和 depth target 创建 view
    ///
    /// 各个 target 尺寸不一致时输出错误，但是仍然创建 framebuffer，使用第一个 target 的尺寸
    ///
    /// 没有任何 target 时返回 None
    pub fn create_framebuffer(
        &mut self,
        render_targets: &[&GfxImage],
        depth_target: Option<&GfxImage>,
    ) -> Option<Framebuffer> {
        let _span = tracy_client::span!("RenderDevice::create_framebuffer");

        let sizes = render_targets
            .iter()
            .chain(depth_target.iter())
            .map(|image| (image.width(), image.height()))
            .collect_vec();
        let Some((width, height)) = validate_framebuffer_sizes(&sizes) else {
            log::error!("Could not create a framebuffer without any render target");
            return None;
        };

        let mut rtv_handles = Vec::with_capacity(render_targets.len());
        let mut views = Vec::with_capacity(render_targets.len());
        for image in render_targets {
            let view = self.create_view(
                image.vk_image(),
                image.format().vk_format(),
                vk::ImageAspectFlags::COLOR,
                &format!("{}-rtv", image.name()),
            );
            rtv_handles.push(self.rtv_heap.insert(view));
            views.push(view);
        }
        let color_formats = render_targets.iter().map(|image| image.format().vk_format()).collect_vec();

        let depth = depth_target.map(|image| {
            let view = self.create_view(
                image.vk_image(),
                image.format().vk_format(),
                image.aspect(),
                &format!("{}-dsv", image.name()),
            );
            (self.dsv_heap.insert(view), view, image.format().vk_format())
        });

        Some(Framebuffer::new(rtv_handles, views, color_formats, depth, width, height))
    }

    /// view 在 `num_frames` 帧之后释放，届时使用该 framebuffer 的命令都已经执行完毕
    pub fn destroy_framebuffer(&mut self, framebuffer: Framebuffer) {
        self.pending_view_releases.push(PendingViewRelease {
            frame_count: self.cur_frame_count,
            rtv_handles: framebuffer.rtv_handles,
            dsv_handle: framebuffer.dsv_handle,
        });
    }

    /// 从 staging pool 中取出至少 `num_bytes` 大小的 buffer，没有合适的 buffer 时创建一个新的
    pub fn get_staging_buffer(&mut self, num_bytes: vk::DeviceSize) -> Option<GfxBuffer> {
        if let Some(buffer) = self.staging_pool.take(num_bytes) {
            return Some(buffer);
        }
        let name = self.staging_pool.next_name();
        log::debug!("Creating staging buffer {} with {} bytes", name, num_bytes);
        self.create_buffer(&BufferCreateInfo {
            name,
            usage: BufferUsage::StagingBuffer,
            size: num_bytes,
        })
    }

    #[inline]
    pub fn return_staging_buffer(&mut self, buffer: GfxBuffer) {
        self.staging_pool.give_back(buffer);
    }

    /// buffer 由下一个提交的 command list 持有，在其执行完毕之后销毁
    #[inline]
    pub fn schedule_buffer_destruction(&mut self, buffer: GfxBuffer) {
        self.pending_buffer_destructions.push(buffer);
    }

    /// image 由下一个提交的 command list 持有，在其执行完毕之后销毁
    #[inline]
    pub fn schedule_image_destruction(&mut self, image: GfxImage) {
        self.pending_image_destructions.push(image);
    }

    /// 调用者需要保证 GPU 不再使用该 buffer
    #[inline]
    pub fn destroy_buffer_immediate(&mut self, buffer: GfxBuffer) {
        drop(buffer);
    }

    /// 调用者需要保证 GPU 不再使用该 image
    #[inline]
    pub fn destroy_image_immediate(&mut self, image: GfxImage) {
        drop(image);
    }
}

// pipelines & bind groups
impl RenderDevice {
    /// 使用标准 pipeline layout，shader 无效时返回 None
    pub fn create_render_pipeline_state(
        &self,
        create_info: &RenderPipelineStateCreateInfo,
    ) -> Option<GfxRenderPipelineState> {
        GfxRenderPipelineState::new(self.device.clone(), self.standard_layout.handle(), create_info)
    }

    /// 使用标准 pipeline layout，shader 无效时返回 None
    pub fn create_compute_pipeline_state(&self, compute_shader: &[u8], name: &str) -> Option<GfxComputePipelineState> {
        GfxComputePipelineState::new(self.device.clone(), self.standard_layout.handle(), compute_shader, name)
    }

    /// 按照标准 pipeline layout 解析名字的 bind group builder
    pub fn create_bind_group_builder(&self) -> BindGroupBuilder {
        BindGroupBuilder::new(
            standard_root_descriptors(self.supports_raytracing()),
            standard_descriptor_table_descriptors(),
            standard_descriptor_table_handles(),
            self.settings.enable_validation,
        )
        .with_heap(self.resource_heap.writer())
    }
}

// command lists
impl RenderDevice {
    fn create_command_list(&mut self, ty: CommandListType) -> CommandList {
        self.command_list_counter += 1;
        let name = format!("{:?} Command List {}", ty, self.command_list_counter);
        let pool = self
            .command_pools
            .get_mut(&ty)
            .unwrap_or_else(|| panic!("No command pool for {:?} command lists", ty));
        CommandList::new(pool.acquire(&name), ty)
    }

    pub fn create_render_command_list(&mut self) -> RenderCommandList {
        RenderCommandList::new(self.create_command_list(CommandListType::Render))
    }

    pub fn create_compute_command_list(&mut self) -> ComputeCommandList {
        ComputeCommandList::new(self.create_command_list(CommandListType::Compute))
    }

    pub fn create_resource_command_list(&mut self) -> ResourceCommandList {
        ResourceCommandList::new(self.create_command_list(CommandListType::Resource))
    }

    /// 提交到主队列，command list 在 GPU 执行完毕之后由 `begin_frame` 回收
    pub fn submit_command_list(&mut self, list: impl Into<CommandList>) {
        self.submit_with_sync(list.into(), &[], &[]);
    }

    /// (semaphore, stage, timeline value)
    fn submit_with_sync(
        &mut self,
        mut list: CommandList,
        waits: &[(vk::Semaphore, vk::PipelineStageFlags2, Option<u64>)],
        signals: &[(vk::Semaphore, vk::PipelineStageFlags2, Option<u64>)],
    ) {
        let _span = tracy_client::span!("RenderDevice::submit_command_list");

        self.flush_initial_transitions();

        std::mem::take(&mut self.pending_buffer_destructions).into_iter().for_each(|b| list.retain_buffer(b));
        std::mem::take(&mut self.pending_image_destructions).into_iter().for_each(|i| list.retain_image(i));

        list.prepare_for_submission();

        let mut submit_info = GfxSubmitInfo::new(&[list.command_buffer().vk_handle()]);
        for (semaphore, stage, value) in waits {
            submit_info = submit_info.wait(*semaphore, *stage, *value);
        }
        for (semaphore, stage, value) in signals {
            submit_info = submit_info.signal(*semaphore, *stage, *value);
        }

        let fence = self.acquire_fence();
        self.gfx_queue.submit(std::slice::from_ref(&submit_info), Some(fence.handle()));
        log::trace!("Submitted {}", list.debug_name());
        self.in_flight.push(fence, list.retire());
    }

    /// 在一个单独的 command list 中执行新创建的 image 的初始 transition
    fn flush_initial_transitions(&mut self) {
        if self.pending_initial_transitions.is_empty() {
            return;
        }
        let transitions = std::mem::take(&mut self.pending_initial_transitions);
        let mut list = self.create_resource_command_list();
        list.set_debug_name("Initial Transitions");
        list.resource_barrier(&transitions);

        let mut list: CommandList = list.into();
        list.prepare_for_submission();
        let submit_info = GfxSubmitInfo::new(&[list.command_buffer().vk_handle()]);
        let fence = self.acquire_fence();
        self.gfx_queue.submit(std::slice::from_ref(&submit_info), Some(fence.handle()));
        self.in_flight.push(fence, list.retire());
    }

    fn acquire_fence(&mut self) -> GfxFence {
        self.free_fences.pop().unwrap_or_else(|| GfxFence::new(self.device.clone(), false, "command-list"))
    }

    /// 按提交顺序回收已经执行完毕的 command list
    fn reclaim_completed_command_lists(&mut self) {
        let _span = tracy_client::span!("RenderDevice::reclaim_completed_command_lists");
        for (fence, retired) in self.in_flight.reclaim() {
            fence.reset();
            self.free_fences.push(fence);
            self.retire_command_list(retired, true);
        }
    }

    fn retire_command_list(&mut self, retired: RetiredCommandList, recycle: bool) {
        let RetiredCommandList {
            ty,
            cmd,
            completion_functions,
            staging_buffers,
            buffers,
            images,
            accelerations,
        } = retired;

        completion_functions.into_iter().for_each(|f| f());
        staging_buffers.into_iter().for_each(|b| self.staging_pool.give_back(b));
        drop(accelerations);
        drop(buffers);
        drop(images);

        if recycle {
            if let Some(pool) = self.command_pools.get_mut(&ty) {
                pool.recycle(cmd);
            }
        }
    }

    fn release_expired_views(&mut self) {
        let num_frames = self.num_frames() as u64;
        let cur_frame_count = self.cur_frame_count;
        let (expired, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_view_releases)
            .into_iter()
            .partition(|release| release.frame_count + num_frames <= cur_frame_count);
        self.pending_view_releases = pending;

        for release in expired {
            release.rtv_handles.into_iter().for_each(|handle| self.rtv_heap.release(handle));
            if let Some(handle) = release.dsv_handle {
                self.dsv_heap.release(handle);
            }
        }
    }
}

// frames
impl RenderDevice {
    /// 1. 回收执行完毕的 command list
    /// 2. 等待该 frame slot 上一次提交的工作完成
    /// 3. 获取 swapchain image，并将其转换到 RenderTarget
    pub fn begin_frame(&mut self, frame_count: u64) {
        let _span = tracy_client::span!("RenderDevice::begin_frame");

        self.cur_frame_count = frame_count;
        self.cur_frame_idx = self.frame_fences.slot_for_frame(frame_count);

        self.reclaim_completed_command_lists();
        self.frame_fences.wait_for_slot(self.cur_frame_idx);
        self.release_expired_views();

        if self.swapchain_needs_recreate {
            self.recreate_swapchain(self.swapchain.extent());
        }
        let acquire_semaphore = self.image_available_semaphores[self.cur_frame_idx].handle();
        let need_recreate = loop {
            match self.swapchain.acquire_next_image(&self.image_available_semaphores[self.cur_frame_idx], u64::MAX) {
                Some(need_recreate) => break need_recreate,
                None => self.recreate_swapchain(self.swapchain.extent()),
            }
        };
        self.swapchain_needs_recreate = need_recreate;

        let image_idx = self.swapchain.current_image_index();
        let before = if self.backbuffer_presented[image_idx] { ResourceState::Present } else { ResourceState::Undefined };
        let mut list = self.create_resource_command_list();
        list.set_debug_name(&format!("Backbuffer to RenderTarget (frame {frame_count})"));
        list.resource_barrier(&[Transition::raw_image(
            self.swapchain.current_image(),
            vk::ImageAspectFlags::COLOR,
            before,
            ResourceState::RenderTarget,
        )]);
        self.submit_with_sync(
            list.into(),
            &[(acquire_semaphore, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, None)],
            &[],
        );
    }

    /// 1. backbuffer 转换到 Present
    /// 2. signal 该 frame slot 的 frame fence
    /// 3. present
    pub fn end_frame(&mut self) {
        let _span = tracy_client::span!("RenderDevice::end_frame");

        let image_idx = self.swapchain.current_image_index();
        let mut list = self.create_resource_command_list();
        list.set_debug_name(&format!("Backbuffer to Present (frame {})", self.cur_frame_count));
        list.resource_barrier(&[Transition::raw_image(
            self.swapchain.current_image(),
            vk::ImageAspectFlags::COLOR,
            ResourceState::RenderTarget,
            ResourceState::Present,
        )]);

        let frame_value = self.frame_fences.advance(self.cur_frame_idx);
        let frame_fence = self.frame_fences.fence(self.cur_frame_idx).handle();
        let render_finished = self.render_finished_semaphores[image_idx].handle();
        self.submit_with_sync(
            list.into(),
            &[],
            &[
                (render_finished, vk::PipelineStageFlags2::ALL_COMMANDS, None),
                (frame_fence, vk::PipelineStageFlags2::ALL_COMMANDS, Some(frame_value)),
            ],
        );
        self.backbuffer_presented[image_idx] = true;

        if self.swapchain.present_image(&self.gfx_queue, &[render_finished]) {
            self.swapchain_needs_recreate = true;
        }
        tracy_client::frame_mark();
    }

    /// 窗口大小变化之后调用
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.recreate_swapchain(vk::Extent2D { width, height });
        self.swapchain_needs_recreate = false;
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) {
        let _span = tracy_client::span!("RenderDevice::recreate_swapchain");
        self.wait_gpu_idle();

        for framebuffer in std::mem::take(&mut self.backbuffer_framebuffers) {
            framebuffer.rtv_handles.into_iter().for_each(|handle| self.rtv_heap.release(handle));
        }
        std::mem::take(&mut self.render_finished_semaphores).into_iter().for_each(GfxSemaphore::destroy);

        self.swapchain.recreate(extent);
        self.create_backbuffer_framebuffers();
    }

    pub fn wait_gpu_idle(&self) {
        let _span = tracy_client::span!("RenderDevice::wait_gpu_idle");
        self.gfx_queue.wait_idle();
        if let Some(queue) = &self.transfer_queue {
            queue.wait_idle();
        }
    }

    /// 在主队列上插入 debug label，作为图形调试工具的捕获范围
    pub fn begin_capture(&self) {
        self.gfx_queue.begin_label("Solis Capture", LabelColor::COLOR_CAPTURE);
    }

    pub fn end_capture(&self) {
        self.gfx_queue.end_label();
    }
}

// destroy
impl RenderDevice {
    /// 1. 等待所有 frame fence
    /// 2. 等待 GPU 空闲
    /// 3. 回收所有 command list，停止后台线程
    /// 4. 依次销毁资源、heap、pool、swapchain、device、instance
    pub fn destroy(mut self) {
        let _span = tracy_client::span!("RenderDevice::destroy");
        log::info!("destroying render device");

        self.frame_fences.wait_all();
        self.device.wait_idle();

        // 剩余的初始 transition 已经没有意义
        self.pending_initial_transitions.clear();
        self.reclaim_completed_command_lists();

        let Self {
            entry: _entry,
            instance,
            debug_messenger,
            device,
            allocator,
            swapchain,
            backbuffer_framebuffers,
            command_pools,
            resource_heap,
            rtv_heap,
            dsv_heap,
            standard_layout,
            in_flight,
            mut free_fences,
            mut staging_pool,
            pending_buffer_destructions,
            pending_image_destructions,
            frame_fences,
            image_available_semaphores,
            render_finished_semaphores,
            ..
        } = self;

        // GPU 已经空闲，剩余的 command list 可以直接释放
        let (finished, leftovers) = in_flight.shutdown();
        let retired = finished
            .into_iter()
            .map(|(fence, retired)| {
                free_fences.push(fence);
                retired
            })
            .chain(leftovers)
            .collect_vec();
        for retired in retired {
            retired.completion_functions.into_iter().for_each(|f| f());
            drop(retired.staging_buffers);
            drop(retired.buffers);
            drop(retired.images);
            drop(retired.accelerations);
        }

        // allocator 持有的资源
        drop(pending_buffer_destructions);
        drop(pending_image_destructions);
        drop(staging_pool.drain());

        free_fences.into_iter().for_each(GfxFence::destroy);
        frame_fences.into_fences().into_iter().for_each(GfxTimelineSemaphore::destroy);
        image_available_semaphores.into_iter().for_each(GfxSemaphore::destroy);
        render_finished_semaphores.into_iter().for_each(GfxSemaphore::destroy);
        drop(backbuffer_framebuffers);

        // heaps
        standard_layout.destroy();
        resource_heap.destroy();
        rtv_heap.destroy();
        dsv_heap.destroy();

        // pools
        command_pools.into_values().for_each(GfxCommandPool::destroy);

        swapchain.destroy();

        match Arc::try_unwrap(allocator) {
            Ok(allocator) => drop(allocator),
            Err(allocator) => log::error!(
                "{} resources are still alive when destroying the memory allocator",
                Arc::strong_count(&allocator) - 1
            ),
        }

        device.destroy();
        debug_messenger.destroy();
        instance.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = RenderDeviceSettings::default();
        assert_eq!(settings.num_frames, 3);
        assert_eq!(settings.max_resource_descriptors, 65536);
        assert_eq!(settings.max_render_target_views, 1024);
        assert_eq!(settings.max_depth_stencil_views, 32);
        assert_eq!(settings.fence_wait_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_settings_partial_override() {
        let settings: RenderDeviceSettings =
            serde_json::from_str(r#"{ "num_frames": 2, "present_mode": "Mailbox" }"#).unwrap();
        assert_eq!(settings.num_frames, 2);
        assert_eq!(settings.present_mode.vk_present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(settings.max_depth_stencil_views, 32);
    }
}
