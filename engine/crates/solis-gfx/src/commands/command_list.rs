use std::ops::{Deref, DerefMut};

use ash::vk;

use crate::commands::barrier::Transition;
use crate::commands::command_buffer::GfxCommandBuffer;
use crate::descriptors::bind_group::BindGroup;
use crate::pipelines::compute_pipeline::GfxComputePipelineState;
use crate::pipelines::graphics_pipeline::GfxRenderPipelineState;
use crate::pipelines::pipeline_layout::{CAMERA_INDEX_OFFSET, MATERIAL_INDEX_OFFSET, MODEL_MATRIX_INDEX_OFFSET};
use crate::raytracing::acceleration::GfxAcceleration;
use crate::resources::buffer::GfxBuffer;
use crate::resources::framebuffer::{Framebuffer, RenderPassAccess};
use crate::resources::image::GfxImage;
use crate::resources::mesh_data_store::MeshDataStore;

/// 决定 command list 从哪个 command pool 中分配
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandListType {
    Render,
    Compute,
    Resource,
}

/// 一次提交的录制单位
///
/// 持有录制过程中需要存活到 GPU 执行完毕的资源，以及执行完毕之后的回调
pub struct CommandList {
    cmd: GfxCommandBuffer,
    ty: CommandListType,
    debug_name: String,

    completion_functions: Vec<Box<dyn FnOnce()>>,
    retained_staging_buffers: Vec<GfxBuffer>,
    retained_buffers: Vec<GfxBuffer>,
    retained_images: Vec<GfxImage>,
    retained_accelerations: Vec<GfxAcceleration>,

    bound_layout: Option<vk::PipelineLayout>,
    in_render_pass: bool,
    closed: bool,
}

/// GPU 执行完毕之后，command list 拆分出的各个部分
pub(crate) struct RetiredCommandList {
    pub ty: CommandListType,
    pub cmd: GfxCommandBuffer,
    pub completion_functions: Vec<Box<dyn FnOnce()>>,
    pub staging_buffers: Vec<GfxBuffer>,
    pub buffers: Vec<GfxBuffer>,
    pub images: Vec<GfxImage>,
    pub accelerations: Vec<GfxAcceleration>,
}

// new & init
impl CommandList {
    /// 创建后立即开始录制
    pub(crate) fn new(cmd: GfxCommandBuffer, ty: CommandListType) -> Self {
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        Self {
            debug_name: cmd.name().to_string(),
            cmd,
            ty,
            completion_functions: Vec::new(),
            retained_staging_buffers: Vec::new(),
            retained_buffers: Vec::new(),
            retained_images: Vec::new(),
            retained_accelerations: Vec::new(),
            bound_layout: None,
            in_render_pass: false,
            closed: false,
        }
    }
}

// getters
impl CommandList {
    #[inline]
    pub fn ty(&self) -> CommandListType {
        self.ty
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    #[inline]
    pub fn command_buffer(&self) -> &GfxCommandBuffer {
        &self.cmd
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

// tools
impl CommandList {
    /// 在 command list 的 fence 被回收时调用，按照添加顺序执行
    pub fn add_completion_function(&mut self, f: impl FnOnce() + 'static) {
        self.completion_functions.push(Box::new(f));
    }

    pub fn set_debug_name(&mut self, name: &str) {
        self.debug_name = name.to_string();
        self.cmd.rename(name);
    }

    /// staging buffer 在 GPU 执行完毕之后回到 RenderDevice 的 staging pool
    #[inline]
    pub fn retain_staging_buffer(&mut self, buffer: GfxBuffer) {
        self.retained_staging_buffers.push(buffer);
    }

    /// buffer 在 GPU 执行完毕之后销毁
    #[inline]
    pub fn retain_buffer(&mut self, buffer: GfxBuffer) {
        self.retained_buffers.push(buffer);
    }

    /// image 在 GPU 执行完毕之后销毁
    #[inline]
    pub fn retain_image(&mut self, image: GfxImage) {
        self.retained_images.push(image);
    }

    /// 被替换的加速结构在 GPU 执行完毕之后销毁
    #[inline]
    pub fn retain_acceleration(&mut self, acceleration: GfxAcceleration) {
        self.retained_accelerations.push(acceleration);
    }

    /// 结束录制，之后只能提交
    pub fn prepare_for_submission(&mut self) {
        if self.closed {
            return;
        }
        if self.in_render_pass {
            log::error!("Command list {} was closed inside a render pass", self.debug_name);
            self.cmd.cmd_end_rendering();
            self.in_render_pass = false;
        }
        self.cmd.end();
        self.closed = true;
    }

    pub(crate) fn retire(self) -> RetiredCommandList {
        RetiredCommandList {
            ty: self.ty,
            cmd: self.cmd,
            completion_functions: self.completion_functions,
            staging_buffers: self.retained_staging_buffers,
            buffers: self.retained_buffers,
            images: self.retained_images,
            accelerations: self.retained_accelerations,
        }
    }
}

/// 只能录制资源传输相关命令
pub struct ResourceCommandList(CommandList);

impl ResourceCommandList {
    pub(crate) fn new(list: CommandList) -> Self {
        Self(list)
    }

    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    pub fn resource_barrier(&self, transitions: &[Transition]) {
        let _span = tracy_client::span!("ResourceCommandList::resource_barrier");
        let (buffer_barriers, image_barriers) = Transition::split(transitions);
        self.cmd.pipeline_barrier(&buffer_barriers, &image_barriers);
    }

    /// dst 需要处于 CopyDest，src 需要处于 CopySource 或者 GenericRead
    ///
    /// - command type: action
    /// - supported queue types: graphics, compute, transfer
    pub fn copy_buffer_region(
        &self,
        dst: &GfxBuffer,
        dst_offset: vk::DeviceSize,
        src: &GfxBuffer,
        src_offset: vk::DeviceSize,
        num_bytes: vk::DeviceSize,
    ) {
        if num_bytes == 0 {
            return;
        }
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size: num_bytes,
        };
        self.cmd.cmd_copy_buffer(src.vk_buffer(), dst.vk_buffer(), std::slice::from_ref(&region));
    }

    /// 将 buffer 中紧密排列的像素拷贝到整个 image 中，image 需要处于 CopyDest
    ///
    /// - command type: action
    /// - supported queue types: graphics, compute, transfer
    pub fn copy_buffer_to_image(&self, src: &GfxBuffer, src_offset: vk::DeviceSize, dst: &GfxImage) {
        let region = vk::BufferImageCopy2::default()
            .buffer_offset(src_offset)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: dst.aspect(),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D::default())
            .image_extent(dst.extent());
        let copy_info = vk::CopyBufferToImageInfo2::default()
            .src_buffer(src.vk_buffer())
            .dst_image(dst.vk_image())
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .regions(std::slice::from_ref(&region));
        self.cmd.cmd_copy_buffer_to_image(&copy_info);
    }

    /// src 需要处于 CopySource，dst 需要处于 CopyDest
    ///
    /// - command type: action
    /// - supported queue types: graphics, compute, transfer
    pub fn copy_image(&self, src: &GfxImage, dst: &GfxImage) {
        if src.extent() != dst.extent() {
            log::error!(
                "Copying image {} ({}x{}) into image {} ({}x{}), only the overlap is copied",
                src.name(),
                src.width(),
                src.height(),
                dst.name(),
                dst.width(),
                dst.height()
            );
        }
        let extent = vk::Extent3D {
            width: src.width().min(dst.width()),
            height: src.height().min(dst.height()),
            depth: src.extent().depth.min(dst.extent().depth),
        };
        let subresource = |image: &GfxImage| vk::ImageSubresourceLayers {
            aspect_mask: image.aspect(),
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageCopy2::default()
            .src_subresource(subresource(src))
            .dst_subresource(subresource(dst))
            .extent(extent);
        let copy_info = vk::CopyImageInfo2::default()
            .src_image(src.vk_image())
            .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .dst_image(dst.vk_image())
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .regions(std::slice::from_ref(&region));
        self.cmd.cmd_copy_image(&copy_info);
    }

    /// 数据大小限制为 64KB，需要在 render pass 之外
    ///
    /// - command type: action
    /// - supported queue types: graphics, compute, transfer
    pub fn update_buffer(&self, dst: &GfxBuffer, offset: vk::DeviceSize, data: &[u8]) {
        if data.len() > 65536 {
            log::error!("update_buffer on {} with {} bytes exceeds the 64KB limit", dst.name(), data.len());
            return;
        }
        self.cmd.cmd_update_buffer(dst.vk_buffer(), offset, data);
    }
}

/// 在资源命令的基础上可以录制 compute 命令
pub struct ComputeCommandList(ResourceCommandList);

impl ComputeCommandList {
    pub(crate) fn new(list: CommandList) -> Self {
        Self(ResourceCommandList::new(list))
    }

    /// - command type: state
    /// - supported queue types: compute
    pub fn set_compute_pipeline_state(&mut self, pipeline: &GfxComputePipelineState) {
        self.cmd.cmd_bind_pipeline(vk::PipelineBindPoint::COMPUTE, pipeline.handle());
        self.bound_layout = Some(pipeline.layout());
    }

    /// - command type: state
    /// - supported queue types: compute
    pub fn bind_compute_resources(&self, bind_group: &BindGroup) {
        let Some(layout) = self.bound_layout else {
            log::error!("Binding compute resources in {} before setting a pipeline", self.debug_name);
            return;
        };
        bind_group.bind_to_compute_signature(&self.cmd, layout);
    }

    /// 写入标准 pipeline layout 的 push constant
    ///
    /// - command type: state
    /// - supported queue types: graphics, compute
    pub fn set_push_constants(&self, offset: u32, data: &[u8]) {
        let Some(layout) = self.bound_layout else {
            log::error!("Setting push constants in {} before setting a pipeline", self.debug_name);
            return;
        };
        self.cmd.cmd_push_constants(layout, vk::ShaderStageFlags::ALL, offset, data);
    }

    /// - command type: action
    /// - supported queue types: compute
    #[inline]
    pub fn dispatch(&self, group_cnt: glam::UVec3) {
        self.cmd.cmd_dispatch(group_cnt);
    }

    /// - command type: action
    /// - supported queue types: compute
    #[inline]
    pub fn build_acceleration_structure(
        &self,
        geometry: &vk::AccelerationStructureBuildGeometryInfoKHR,
        ranges: &[vk::AccelerationStructureBuildRangeInfoKHR],
    ) {
        self.cmd.cmd_build_acceleration_structure(geometry, ranges);
    }
}

/// 可以录制所有类型的命令
pub struct RenderCommandList(ComputeCommandList);

impl RenderCommandList {
    pub(crate) fn new(list: CommandList) -> Self {
        Self(ComputeCommandList::new(list))
    }

    /// 开始 dynamic rendering，并将 viewport 和 scissor 设置为 framebuffer 的大小
    ///
    /// - command type: action, state
    /// - supported queue types: graphics
    pub fn begin_render_pass(&mut self, framebuffer: &Framebuffer, access: RenderPassAccess) {
        let _span = tracy_client::span!("RenderCommandList::begin_render_pass");
        if self.in_render_pass {
            log::error!("Render pass already began in {}", self.debug_name);
            self.end_render_pass();
        }

        let color_attachments = framebuffer.color_attachments(access.color_load);
        let depth_attachment = framebuffer.depth_attachment(access.depth_load);
        let mut render_info = vk::RenderingInfo::default()
            .layer_count(1)
            .render_area(framebuffer.render_area())
            .color_attachments(&color_attachments);
        if let Some(depth_attachment) = depth_attachment.as_ref() {
            render_info = render_info.depth_attachment(depth_attachment);
        }

        self.cmd.cmd_begin_rendering(&render_info);
        self.in_render_pass = true;
        self.set_viewport_and_scissor(framebuffer.width(), framebuffer.height());
    }

    /// - command type: action, state
    /// - supported queue types: graphics
    pub fn end_render_pass(&mut self) {
        if !self.in_render_pass {
            log::error!("end_render_pass called outside a render pass in {}", self.debug_name);
            return;
        }
        self.cmd.cmd_end_rendering();
        self.in_render_pass = false;
    }

    /// - command type: state
    /// - supported queue types: graphics
    pub fn set_pipeline_state(&mut self, pipeline: &GfxRenderPipelineState) {
        self.cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline.handle());
        self.bound_layout = Some(pipeline.layout());
    }

    /// - command type: state
    /// - supported queue types: graphics
    pub fn bind_render_resources(&self, bind_group: &BindGroup) {
        let Some(layout) = self.bound_layout else {
            log::error!("Binding render resources in {} before setting a pipeline", self.debug_name);
            return;
        };
        bind_group.bind_to_graphics_signature(&self.cmd, layout);
    }

    #[inline]
    pub fn set_camera_index(&self, camera_index: u32) {
        self.set_push_constants(CAMERA_INDEX_OFFSET, bytemuck::bytes_of(&camera_index));
    }

    #[inline]
    pub fn set_material_index(&self, material_index: u32) {
        self.set_push_constants(MATERIAL_INDEX_OFFSET, bytemuck::bytes_of(&material_index));
    }

    #[inline]
    pub fn set_model_matrix_index(&self, model_matrix_index: u32) {
        self.set_push_constants(MODEL_MATRIX_INDEX_OFFSET, bytemuck::bytes_of(&model_matrix_index));
    }

    /// 绑定 vertex buffer，index buffer 以及 primitive topology
    #[inline]
    pub fn bind_mesh_data(&self, mesh_data: &MeshDataStore) {
        mesh_data.bind_to_command_list(self);
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn draw(&self, num_indices: u32, first_index: u32, num_instances: u32) {
        self.cmd.cmd_draw_indexed(num_indices, first_index, num_instances, 0, 0);
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn draw_vertices(&self, num_vertices: u32) {
        self.cmd.cmd_draw(num_vertices, 1, 0, 0);
    }

    /// 翻转 y 轴，使 NDC 的 y 轴朝上
    ///
    /// - command type: state
    /// - supported queue types: graphics
    pub fn set_viewport_and_scissor(&self, width: u32, height: u32) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: height as f32,
            width: width as f32,
            height: -(height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: vk::Extent2D { width, height },
        };
        self.cmd.cmd_set_viewport(0, std::slice::from_ref(&viewport));
        self.cmd.cmd_set_scissor(0, std::slice::from_ref(&scissor));
    }

    /// 用于 capture 工具中区分各个 pass
    pub fn begin_label(&self, name: &str) {
        self.cmd.begin_label(name, crate::basic::color::LabelColor::COLOR_PASS);
    }

    pub fn end_label(&self) {
        self.cmd.end_label();
    }
}

impl Deref for ResourceCommandList {
    type Target = CommandList;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl DerefMut for ResourceCommandList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
impl Deref for ComputeCommandList {
    type Target = ResourceCommandList;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl DerefMut for ComputeCommandList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
impl Deref for RenderCommandList {
    type Target = ComputeCommandList;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl DerefMut for RenderCommandList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<ResourceCommandList> for CommandList {
    fn from(list: ResourceCommandList) -> Self {
        list.0
    }
}
impl From<ComputeCommandList> for CommandList {
    fn from(list: ComputeCommandList) -> Self {
        list.0.0
    }
}
impl From<RenderCommandList> for CommandList {
    fn from(list: RenderCommandList) -> Self {
        list.0.0.0
    }
}
