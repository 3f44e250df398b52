use std::time::Instant;

use ash::vk;
use glam::UVec3;
use itertools::Itertools;
use solis_crate_tools::resource::{SolisPath, load_shader};
use solis_gfx::commands::barrier::Transition;
use solis_gfx::commands::command_list::{ComputeCommandList, ResourceCommandList};
use solis_gfx::commands::resource_state::ResourceState;
use solis_gfx::descriptors::bind_group::{BindGroup, BindGroupBuilder};
use solis_gfx::descriptors::descriptor_allocator::DescriptorHandle;
use solis_gfx::descriptors::descriptor_heap::{DescriptorWrite, HeapArray, HeapResource};
use solis_gfx::pipelines::compute_pipeline::GfxComputePipelineState;
use solis_gfx::pipelines::pipeline_layout::{
    CAMERAS_ROOT_DESCRIPTOR, LIGHTS_ROOT_DESCRIPTOR, MATERIAL_BUFFER_ROOT_DESCRIPTOR, MODEL_MATRICES_ROOT_DESCRIPTOR,
    PER_FRAME_DATA_ROOT_DESCRIPTOR, RAYTRACING_SCENE_ROOT_DESCRIPTOR, TEXTURES_TABLE,
};
use solis_gfx::render_device::{RenderDevice, RenderDeviceWindow};
use solis_gfx::resources::buffer::{BufferCreateInfo, BufferUsage, GfxBuffer};
use solis_gfx::resources::framebuffer::Framebuffer;
use solis_gfx::resources::image::{GfxImage, ImageCreateInfo, ImageFormat, ImageUsage};
use solis_gfx::resources::mesh_data_store::{Mesh, MeshDataStore};
use solis_gfx::resources::vertex::StandardVertex;
use solis_render_interface::components::{MeshRange, RaytracingObjectComponent, TransformComponent};
use solis_render_interface::gpu_data::{Light, PerFrameData, StandardMaterial};
use solis_render_interface::handles::{MaterialHandle, RaytracableGeometryHandle, StandardMaterialHandle, TextureHandle};
use solis_render_interface::image_registry::ImageRegistry;
use solis_render_interface::material_arena::MaterialArena;
use solis_render_interface::registry::{RenderRegistry, SynchronizedResource};
use solis_render_interface::world::World;

use crate::builtin_resources::{self, CUBE_INDICES, CUBE_VERTICES, ImageData};
use crate::frame_buffers::{CameraMatrixBuffer, ModelMatrixBuffers, PerFrameBuffers};
use crate::raytracing_scene::RaytracingSceneBuilder;
use crate::render_passes::denoiser_pass::DenoiserPass;
use crate::render_passes::forward_pass::ForwardPass;
use crate::render_passes::ui_pass::{UiPass, UiRenderer};
use crate::render_passes::{PassContext, RenderPass, RenderPasses};
use crate::settings::RendererSettings;
use crate::upload_slots::UploadSlotRecycler;

/// make_image_opaque.compute 中 workgroup 的大小
const OPAQUE_WORKGROUP_SIZE: u32 = 8;

/// 覆盖整张图像所需的 workgroup 数量
pub fn dispatch_group_count(width: u32, height: u32) -> UVec3 {
    UVec3::new(width.div_ceil(OPAQUE_WORKGROUP_SIZE), height.div_ceil(OPAQUE_WORKGROUP_SIZE), 1)
}

/// 只为变化过的 index 生成纹理数组的写入，空位使用 `fallback` 填充
///
/// 超出纹理数组的 index 会被跳过
pub fn texture_table_writes<V: Copy>(
    changed: &[u32],
    lookup: impl Fn(u32) -> Option<V>,
    fallback: Option<V>,
    num_slots: u32,
) -> Vec<(u32, V)> {
    changed
        .iter()
        .filter_map(|&index| {
            if index >= num_slots {
                log::error!("Texture {} does not fit in the texture table with {} slots", index, num_slots);
                return None;
            }
            lookup(index).or(fallback).map(|view| (index, view))
        })
        .collect()
}

/// 渲染器
///
/// 持有 RenderDevice 以及所有帧相关的资源，每一帧的流程：
/// 1. `begin_frame`
/// 2. `render_all`
/// 3. `end_frame`
pub struct Renderer {
    settings: RendererSettings,
    start_time: Instant,
    output_size: (u32, u32),

    device: RenderDevice,
    static_mesh_store: MeshDataStore,

    per_frame_data: PerFrameData,
    per_frame_data_buffers: PerFrameBuffers,

    camera_matrix_buffers: CameraMatrixBuffer,

    lights: Vec<Light>,
    light_buffers: PerFrameBuffers,

    material_arena: MaterialArena,
    material_device_buffers: PerFrameBuffers,

    model_matrix_buffers: ModelMatrixBuffers,

    images: ImageRegistry<GfxImage>,
    /// 纹理数组在 heap 中预留的槽位数量
    num_texture_slots: u32,
    /// 上传纹理时使用的 storage image 槽位，随上传的 command list 一起释放
    upload_slots: UploadSlotRecycler<DescriptorHandle>,
    make_image_opaque_pipeline: Option<GfxComputePipelineState>,

    raytracing_scene: RaytracingSceneBuilder,
    render_passes: RenderPasses,

    pink_texture: TextureHandle,
    noise_texture: TextureHandle,
    normal_roughness_texture: TextureHandle,
    specular_emission_texture: TextureHandle,
    cube_mesh: Mesh,
}

// new & init
impl Renderer {
    /// 资源创建失败是致命错误
    pub fn new(window: &RenderDeviceWindow, settings: RendererSettings) -> Self {
        let _span = tracy_client::span!("Renderer::new");
        log::info!("Initializing renderer with {} frames in flight", settings.num_frames);

        let mut device = RenderDevice::new("Solis", settings.device_settings(), window);
        let num_frames = device.num_frames();

        // 纹理数组从 sampled image 数组的起始位置开始
        let capacity = device.resource_heap().allocator(HeapArray::SampledImage).capacity();
        let num_texture_slots = texture_table_size(settings.max_num_textures, capacity);
        let first_slot = device.resource_heap_mut().allocator_mut(HeapArray::SampledImage).acquire_range(num_texture_slots);
        if first_slot.index() != 0 {
            log::error!("Texture table starts at heap slot {} instead of 0", first_slot.index());
        }

        let vertex_buffer = device
            .create_buffer(&BufferCreateInfo {
                name: "Static mesh vertex buffer".to_string(),
                usage: BufferUsage::VertexBuffer,
                size: settings.static_mesh_vertex_buffer_size,
            })
            .unwrap_or_else(|| panic!("Could not create the static mesh vertex buffer"));
        let index_buffer = device
            .create_buffer(&BufferCreateInfo {
                name: "Static mesh index buffer".to_string(),
                usage: BufferUsage::IndexBuffer,
                size: settings.static_mesh_index_buffer_size,
            })
            .unwrap_or_else(|| panic!("Could not create the static mesh index buffer"));

        let per_frame_data_buffers =
            PerFrameBuffers::new(&device, "per-frame-data", size_of::<PerFrameData>() as vk::DeviceSize)
                .unwrap_or_else(|| panic!("Could not create the per-frame data buffers"));
        let camera_matrix_buffers = CameraMatrixBuffer::new(&device, settings.max_num_cameras)
            .unwrap_or_else(|| panic!("Could not create the camera matrix buffers"));
        let light_buffers = PerFrameBuffers::new(
            &device,
            "lights",
            (settings.max_num_lights as usize * size_of::<Light>()) as vk::DeviceSize,
        )
        .unwrap_or_else(|| panic!("Could not create the light buffers"));
        let material_device_buffers = PerFrameBuffers::new(&device, "materials", settings.material_buffer_size)
            .unwrap_or_else(|| panic!("Could not create the material buffers"));
        let model_matrix_buffers = ModelMatrixBuffers::new(&device, settings.max_model_matrices)
            .unwrap_or_else(|| panic!("Could not create the model matrix buffers"));

        let make_image_opaque_pipeline =
            device.create_compute_pipeline_state(&load_shader("make_image_opaque.compute"), "Make image opaque");
        if make_image_opaque_pipeline.is_none() {
            log::warn!("Could not create the make-image-opaque pipeline, textures will be uploaded without it");
        }

        let raytracing_enabled = settings.enable_raytracing && device.supports_raytracing();
        log::info!("Raytracing is {}", if raytracing_enabled { "enabled" } else { "disabled" });

        let (width, height) = device.backbuffer_size();
        let output_size = settings.render_size(width, height);

        let mut renderer = Self {
            start_time: Instant::now(),
            output_size,
            static_mesh_store: MeshDataStore::new(vertex_buffer, index_buffer),

            per_frame_data: PerFrameData::default(),
            per_frame_data_buffers,
            camera_matrix_buffers,
            lights: vec![Light::default(); settings.max_num_lights as usize],
            light_buffers,
            material_arena: MaterialArena::new(settings.material_buffer_size as usize),
            material_device_buffers,
            model_matrix_buffers,

            images: ImageRegistry::new(num_frames),
            num_texture_slots,
            upload_slots: UploadSlotRecycler::new(),
            make_image_opaque_pipeline,

            raytracing_scene: RaytracingSceneBuilder::new(),
            render_passes: RenderPasses::new(),

            pink_texture: TextureHandle::default(),
            noise_texture: TextureHandle::default(),
            normal_roughness_texture: TextureHandle::default(),
            specular_emission_texture: TextureHandle::default(),
            cube_mesh: Mesh::default(),

            device,
            settings,
        };

        renderer.create_builtin_resources();
        renderer.create_render_passes();

        log::info!("Renderer initialized with output size {}x{}", output_size.0, output_size.1);
        renderer
    }

    fn create_builtin_resources(&mut self) {
        let _span = tracy_client::span!("Renderer::create_builtin_resources");
        let mut commands = self.device.create_compute_command_list();
        commands.set_debug_name("Builtin resources upload");

        // pink 最先创建，之后的纹理上传失败时会用到它
        self.pink_texture = self.upload_builtin_image("Pink", &builtin_resources::pink_texture(), &mut commands, true);

        let noise_path = SolisPath::resources_path(&self.settings.noise_texture_path);
        let noise = builtin_resources::noise_texture(&noise_path);
        self.noise_texture = self.upload_builtin_image("Noise", &noise, &mut commands, true);

        // alpha 通道保存了 roughness 与 emission，不能变成不透明
        self.normal_roughness_texture = self.upload_builtin_image(
            "Default normal roughness",
            &builtin_resources::default_normal_roughness_texture(),
            &mut commands,
            false,
        );
        self.specular_emission_texture = self.upload_builtin_image(
            "Default specular color emission",
            &builtin_resources::default_specular_color_emission_texture(),
            &mut commands,
            false,
        );

        self.static_mesh_store.begin_adding_meshes(&commands);
        match self.static_mesh_store.add_mesh(&mut self.device, &CUBE_VERTICES, &CUBE_INDICES, &mut commands) {
            Some(mesh) => self.cube_mesh = mesh,
            None => log::error!("Could not add the builtin cube mesh"),
        }
        self.static_mesh_store.end_adding_meshes(&commands);

        self.device.submit_command_list(commands);
    }

    fn upload_builtin_image(
        &mut self,
        name: &str,
        data: &ImageData,
        commands: &mut ComputeCommandList,
        make_opaque: bool,
    ) -> TextureHandle {
        let info = ImageCreateInfo::new(name, ImageUsage::SampledImage, ImageFormat::Rgba8, data.width, data.height);
        self.upload_image_data(&info, &data.pixels, commands, make_opaque)
    }

    /// pass 的顺序：forward -> denoiser -> UI
    fn create_render_passes(&mut self) {
        let _span = tracy_client::span!("Renderer::create_render_passes");
        let (width, height) = self.output_size;

        let forward = ForwardPass::new(self, width, height);
        let denoiser = DenoiserPass::new(self, width, height, &forward);
        let ui = UiPass::new(self);

        let mut passes = RenderPasses::new();
        passes.push(RenderPass::Forward(forward));
        passes.push(RenderPass::Denoiser(denoiser));
        passes.push(RenderPass::Ui(ui));
        self.render_passes = passes;
    }
}

// getters
impl Renderer {
    #[inline]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[inline]
    pub fn get_render_device(&self) -> &RenderDevice {
        &self.device
    }

    #[inline]
    pub fn get_render_device_mut(&mut self) -> &mut RenderDevice {
        &mut self.device
    }

    #[inline]
    pub fn get_static_mesh_store(&self) -> &MeshDataStore {
        &self.static_mesh_store
    }

    #[inline]
    pub fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    #[inline]
    pub fn raytracing_enabled(&self) -> bool {
        self.settings.enable_raytracing && self.device.supports_raytracing()
    }

    #[inline]
    pub fn get_pink_texture(&self) -> TextureHandle {
        self.pink_texture
    }

    #[inline]
    pub fn get_noise_texture(&self) -> TextureHandle {
        self.noise_texture
    }

    #[inline]
    pub fn get_default_normal_roughness_texture(&self) -> TextureHandle {
        self.normal_roughness_texture
    }

    #[inline]
    pub fn get_default_specular_color_emission_texture(&self) -> TextureHandle {
        self.specular_emission_texture
    }

    #[inline]
    pub fn get_cube_mesh(&self) -> Mesh {
        self.cube_mesh
    }

    #[inline]
    pub fn get_image_handle(&self, name: &str) -> Option<TextureHandle> {
        self.images.handle_of(name)
    }

    #[inline]
    pub fn get_image(&self, handle: TextureHandle) -> Option<&GfxImage> {
        self.images.get(handle)
    }

    #[inline]
    pub fn get_image_by_name(&self, name: &str) -> Option<&GfxImage> {
        self.images.get_by_name(name)
    }

    #[inline]
    pub fn get_standard_material_buffer_for_frame(&self, frame_idx: usize) -> &GfxBuffer {
        self.material_device_buffers.get(frame_idx)
    }

    #[inline]
    pub fn get_model_matrix_for_frame(&self, frame_idx: usize) -> &GfxBuffer {
        self.model_matrix_buffers.get(frame_idx)
    }

    #[inline]
    pub fn get_standard_material(&self, handle: StandardMaterialHandle) -> &StandardMaterial {
        self.material_arena.get_ref(MaterialHandle::from_index(handle.index))
    }

    #[inline]
    pub fn get_standard_material_mut(&mut self, handle: StandardMaterialHandle) -> &mut StandardMaterial {
        self.material_arena.get(MaterialHandle::from_index(handle.index))
    }

    /// mesh 在 forward pass 中使用的 index 范围
    #[inline]
    pub fn mesh_range(mesh: &Mesh) -> MeshRange {
        MeshRange {
            first_index: mesh.first_index,
            num_indices: mesh.num_indices,
        }
    }
}

// tools
impl Renderer {
    /// 创建失败时返回 pink 纹理
    pub fn create_image(&mut self, create_info: &ImageCreateInfo) -> TextureHandle {
        let Some(image) = self.device.create_image(create_info) else {
            log::error!("Could not create image {}, using the pink texture", create_info.name);
            return self.pink_texture;
        };
        self.register_image(&create_info.name, image)
    }

    fn register_image(&mut self, name: &str, image: GfxImage) -> TextureHandle {
        let handle = self.images.insert(name, image);
        if handle.index >= self.num_texture_slots {
            log::error!(
                "Image {} got texture index {}, but the texture table only has {} slots",
                name,
                handle.index,
                self.num_texture_slots
            );
        }
        handle
    }

    /// 所有 target 都不存在时返回 None
    pub fn create_framebuffer(
        &mut self,
        render_targets: &[TextureHandle],
        depth_target: Option<TextureHandle>,
    ) -> Option<Framebuffer> {
        let color_images = render_targets
            .iter()
            .filter_map(|&handle| {
                let image = self.images.get(handle);
                if image.is_none() {
                    log::error!("Framebuffer render target {} does not exist", handle);
                }
                image
            })
            .collect_vec();
        let depth_image = depth_target.and_then(|handle| self.images.get(handle));
        self.device.create_framebuffer(&color_images, depth_image)
    }

    /// 上传 RGBA8 数据，并将 alpha 通道设为 1
    pub fn create_image_with_data(
        &mut self,
        create_info: &ImageCreateInfo,
        data: &[u8],
        commands: &mut ComputeCommandList,
    ) -> TextureHandle {
        self.upload_image_data(create_info, data, commands, true)
    }

    /// 1. 数据经由 staging buffer 拷贝到 scratch image
    /// 2. compute shader 将 scratch image 写入最终的 image，同时把 alpha 设为 1
    /// 3. scratch image 与 storage image 槽位由 command list 持有，执行完毕之后释放
    ///
    /// 不需要修改 alpha 或者没有 compute pipeline 时，直接拷贝到最终的 image
    fn upload_image_data(
        &mut self,
        create_info: &ImageCreateInfo,
        data: &[u8],
        commands: &mut ComputeCommandList,
        make_opaque: bool,
    ) -> TextureHandle {
        let _span = tracy_client::span!("Renderer::upload_image_data");
        let expected_size =
            create_info.width as usize * create_info.height as usize * create_info.format.pixel_size();
        if data.len() < expected_size {
            log::error!(
                "Image {} needs {} bytes of data, but only {} were provided",
                create_info.name,
                expected_size,
                data.len()
            );
            return self.pink_texture;
        }

        let Some(staging) = self.device.get_staging_buffer(expected_size as vk::DeviceSize) else {
            log::error!("Could not get a staging buffer for image {}", create_info.name);
            return self.pink_texture;
        };
        let Some(image) = self.device.create_image(create_info) else {
            log::error!("Could not create image {}, using the pink texture", create_info.name);
            self.device.return_staging_buffer(staging);
            return self.pink_texture;
        };
        staging.write_bytes(0, &data[..expected_size]);

        let scratch = match (&self.make_image_opaque_pipeline, make_opaque) {
            (Some(_), true) => {
                let scratch_info = ImageCreateInfo {
                    name: format!("{} scratch", create_info.name),
                    usage: ImageUsage::UnorderedAccess,
                    ..create_info.clone()
                };
                self.device.create_image(&scratch_info)
            }
            _ => None,
        };

        match (scratch, &self.make_image_opaque_pipeline) {
            (Some(scratch), Some(pipeline)) => {
                commands.resource_barrier(&[Transition::image(
                    &scratch,
                    ResourceState::UnorderedAccess,
                    ResourceState::CopyDest,
                )]);
                commands.copy_buffer_to_image(&staging, 0, &scratch);
                commands.resource_barrier(&[
                    Transition::image(&scratch, ResourceState::CopyDest, ResourceState::UnorderedAccess),
                    Transition::image(&image, image.initial_state(), ResourceState::UnorderedAccess),
                ]);

                let heap = self.device.resource_heap_mut();
                let storage_images = heap.allocator_mut(HeapArray::StorageImage);
                let (src_slot, dst_slot) = (storage_images.acquire(), storage_images.acquire());
                heap.writer().write(&[
                    DescriptorWrite {
                        array: HeapArray::StorageImage,
                        index: src_slot.index(),
                        resource: HeapResource::Image(scratch.view()),
                    },
                    DescriptorWrite {
                        array: HeapArray::StorageImage,
                        index: dst_slot.index(),
                        resource: HeapResource::Image(image.view()),
                    },
                ]);

                commands.set_compute_pipeline_state(pipeline);
                commands.bind_compute_resources(&self.global_bind_group_builder(self.device.frame_idx()).build());
                let indices = [src_slot.index(), dst_slot.index(), 0];
                commands.set_push_constants(0, bytemuck::bytes_of(&indices));
                commands.dispatch(dispatch_group_count(create_info.width, create_info.height));

                commands.resource_barrier(&[Transition::image(
                    &image,
                    ResourceState::UnorderedAccess,
                    image.initial_state(),
                )]);

                commands.add_completion_function(self.upload_slots.release_on_completion(vec![src_slot, dst_slot]));
                commands.retain_image(scratch);
            }
            (scratch, _) => {
                if make_opaque {
                    log::debug!("Uploading image {} without the make-image-opaque pass", create_info.name);
                }
                if let Some(scratch) = scratch {
                    self.device.schedule_image_destruction(scratch);
                }
                commands.resource_barrier(&[Transition::image(&image, image.initial_state(), ResourceState::CopyDest)]);
                commands.copy_buffer_to_image(&staging, 0, &image);
                commands.resource_barrier(&[Transition::image(&image, ResourceState::CopyDest, image.initial_state())]);
            }
        }

        commands.retain_staging_buffer(staging);
        log::debug!("Uploaded image {} ({}x{})", create_info.name, create_info.width, create_info.height);
        self.register_image(&create_info.name, image)
    }

    /// 图像在 `num_frames` 帧之后销毁，handle 立即失效
    pub fn schedule_texture_destruction(&mut self, handle: TextureHandle) {
        self.images.schedule_destruction(handle, self.device.frame_count());
    }

    /// mesh 的 index 已经加上了 `first_vertex`
    pub fn add_static_mesh(
        &mut self,
        vertices: &[StandardVertex],
        indices: &[u32],
        commands: &mut ResourceCommandList,
    ) -> Option<Mesh> {
        self.static_mesh_store.begin_adding_meshes(commands);
        let mesh = self.static_mesh_store.add_mesh(&mut self.device, vertices, indices, commands);
        self.static_mesh_store.end_adding_meshes(commands);
        mesh
    }

    /// 材质空间用尽时返回 None
    pub fn allocate_standard_material(&mut self, material: StandardMaterial) -> Option<StandardMaterialHandle> {
        let handle = self.material_arena.create_material(material)?;
        Some(StandardMaterialHandle::new(handle.index()))
    }

    pub fn deallocate_standard_material(&mut self, handle: StandardMaterialHandle) {
        self.material_arena.free(MaterialHandle::<StandardMaterial>::from_index(handle.index));
    }

    /// 使用内置的默认纹理
    pub fn default_standard_material(&self) -> StandardMaterial {
        StandardMaterial {
            albedo: self.pink_texture,
            normal_roughness: self.normal_roughness_texture,
            specular_color_emission: self.specular_emission_texture,
            noise: self.noise_texture,
        }
    }

    /// 可以在多个线程中同时调用，返回 model matrix 在本帧 buffer 中的位置
    #[inline]
    pub fn add_model_matrix_to_frame(&self, transform: &TransformComponent, frame_idx: usize) -> u32 {
        self.model_matrix_buffers.add(transform, frame_idx)
    }

    /// 光追关闭或者设备不支持时返回 None
    pub fn create_raytracing_geometry(
        &mut self,
        meshes: &[Mesh],
        commands: &mut ComputeCommandList,
    ) -> Option<RaytracableGeometryHandle> {
        if !self.raytracing_enabled() {
            log::warn!("Raytracing is disabled, not creating raytracing geometry");
            return None;
        }
        self.raytracing_scene.create_raytracing_geometry(
            &self.device,
            self.static_mesh_store.vertex_buffer(),
            self.static_mesh_store.index_buffer(),
            meshes,
            commands,
        )
    }

    /// TLAS 在下一次 `render_all` 时重新构建
    pub fn add_raytracing_objects_to_scene(&mut self, objects: &[RaytracingObjectComponent]) {
        if !self.raytracing_enabled() {
            log::debug!("Raytracing is disabled, ignoring {} raytracing objects", objects.len());
            return;
        }
        self.raytracing_scene.add_raytracing_objects_to_scene(objects);
    }

    pub fn set_ui_renderer(&mut self, ui_renderer: Option<UiRenderer>) {
        let mut ui_renderer = ui_renderer;
        for pass in self.render_passes.iter_mut() {
            if let RenderPass::Ui(ui_pass) = pass {
                ui_pass.set_ui_renderer(ui_renderer.take());
            }
        }
        if ui_renderer.is_some() {
            log::warn!("No UI pass to receive the UI renderer");
        }
    }

    /// 本帧所有 pass 共享的资源
    pub fn global_bind_group_builder(&self, frame_idx: usize) -> BindGroupBuilder {
        let _span = tracy_client::span!("Renderer::global_bind_group_builder");
        let mut builder = self.device.create_bind_group_builder();
        builder
            .set_buffer(CAMERAS_ROOT_DESCRIPTOR, self.camera_matrix_buffers.get_device_buffer(frame_idx))
            .set_buffer(MATERIAL_BUFFER_ROOT_DESCRIPTOR, self.material_device_buffers.get(frame_idx))
            .set_buffer(LIGHTS_ROOT_DESCRIPTOR, self.light_buffers.get(frame_idx))
            .set_buffer(PER_FRAME_DATA_ROOT_DESCRIPTOR, self.per_frame_data_buffers.get(frame_idx))
            .set_buffer(MODEL_MATRICES_ROOT_DESCRIPTOR, self.model_matrix_buffers.get(frame_idx));

        // 纹理数组由 `flush_texture_table` 增量写入
        builder.mark_table_resident(TEXTURES_TABLE);

        if self.device.supports_raytracing() {
            if let Some(scene) = self.raytracing_scene.scene() {
                builder.set_acceleration_structure(RAYTRACING_SCENE_ROOT_DESCRIPTOR, scene.handle());
            }
        }
        builder
    }

    #[inline]
    pub fn bind_global_resources_for_frame(&self, frame_idx: usize) -> BindGroup {
        self.global_bind_group_builder(frame_idx).build()
    }

    /// 只重写新增或者回收过的纹理槽位，其余槽位可能正在被 in-flight 的帧读取
    fn flush_texture_table(&mut self) {
        let _span = tracy_client::span!("Renderer::flush_texture_table");
        let changed = self.images.take_changed_indices();
        if changed.is_empty() {
            return;
        }

        let fallback = self
            .images
            .get(self.pink_texture)
            .or_else(|| self.images.iter_slots().flatten().next())
            .map(|image| image.view());
        let writes = texture_table_writes(
            &changed,
            |index| self.images.get(TextureHandle::new(index)).map(|image| image.view()),
            fallback,
            self.num_texture_slots,
        )
        .into_iter()
        .map(|(index, view)| DescriptorWrite {
            array: HeapArray::SampledImage,
            index,
            resource: HeapResource::Image(view),
        })
        .collect_vec();

        log::debug!("Writing {} of {} changed texture table slots", writes.len(), changed.len());
        self.device.resource_heap().writer().write(&writes);
    }

    pub fn begin_device_capture(&self) {
        self.device.begin_capture();
    }

    pub fn end_device_capture(&self) {
        self.device.end_capture();
    }
}

// update
impl Renderer {
    /// 1. 等待该 frame slot 之前的工作完成
    /// 2. 回收到期的图像以及上传纹理的 descriptor，更新纹理数组
    /// 3. 重置本帧的 model matrix
    pub fn begin_frame(&mut self, frame_count: u64) {
        let _span = tracy_client::span!("Renderer::begin_frame");
        self.device.begin_frame(frame_count);
        let frame_idx = self.device.frame_idx();

        let expired = self.images.collect_expired(frame_count);
        if !expired.is_empty() {
            log::debug!("Destroying {} expired images", expired.len());
        }
        drop(expired);
        self.flush_texture_table();

        // device.begin_frame 已经执行了完成的 command list 的 completion function
        let storage_images = self.device.resource_heap_mut().allocator_mut(HeapArray::StorageImage);
        for handle in self.upload_slots.drain() {
            storage_images.release(handle);
        }

        self.model_matrix_buffers.reset(frame_idx);

        self.per_frame_data.time_since_start = self.start_time.elapsed().as_secs_f32();
        self.per_frame_data.frame_count = frame_count as u32;
        self.per_frame_data.render_width = self.output_size.0;
        self.per_frame_data.render_height = self.output_size.1;
    }

    /// 上传本帧的数据，然后依次执行所有 pass
    pub fn render_all<R: RenderRegistry>(&mut self, registry: &SynchronizedResource<R>, world: &World) {
        let _span = tracy_client::span!("Renderer::render_all");
        let frame_idx = self.device.frame_idx();
        let registry = registry.lock();

        // begin_frame 之后注册的纹理
        self.flush_texture_table();
        self.update_cameras(&*registry, frame_idx);
        self.update_lights(&*registry, frame_idx);
        self.per_frame_data_buffers.write_pod(frame_idx, std::slice::from_ref(&self.per_frame_data));
        self.material_device_buffers.write_bytes(frame_idx, self.material_arena.data());

        let mut commands = self.device.create_render_command_list();
        commands.set_debug_name(&format!("Render frame {}", self.device.frame_count()));

        if self.raytracing_scene.is_dirty() {
            self.raytracing_scene.rebuild_raytracing_scene(&self.device, &mut commands);
        }

        let global_resources = self.global_bind_group_builder(frame_idx);
        let mut passes = std::mem::take(&mut self.render_passes);
        {
            let mut ctx = PassContext {
                device: &self.device,
                images: &self.images,
                mesh_store: &self.static_mesh_store,
                model_matrices: &self.model_matrix_buffers,
                global_resources: &global_resources,
                previous_output: None,
            };
            passes.render_all(&mut ctx, &mut commands, &*registry, frame_idx, world);
        }
        self.render_passes = passes;

        self.device.submit_command_list(commands);
    }

    pub fn end_frame(&mut self) {
        let _span = tracy_client::span!("Renderer::end_frame");
        self.device.end_frame();
    }

    fn update_cameras(&mut self, registry: &dyn RenderRegistry, frame_idx: usize) {
        let _span = tracy_client::span!("Renderer::update_cameras");
        for (transform, camera) in registry.cameras() {
            self.camera_matrix_buffers.set_camera_matrices(transform, camera);
        }
        self.camera_matrix_buffers.upload(frame_idx);
    }

    fn update_lights(&mut self, registry: &dyn RenderRegistry, frame_idx: usize) {
        let _span = tracy_client::span!("Renderer::update_lights");
        for light in registry.lights() {
            match self.lights.get_mut(light.handle.index as usize) {
                Some(slot) => *slot = light.light,
                None => log::error!("{} is out of range ({} lights max)", light.handle, self.lights.len()),
            }
        }
        self.light_buffers.write_pod(frame_idx, &self.lights);
    }

    /// swapchain 跟随窗口大小，内部 render target 按照 render scale 重新创建
    pub fn resize(&mut self, width: u32, height: u32) {
        let _span = tracy_client::span!("Renderer::resize");
        if width == 0 || height == 0 {
            return;
        }
        self.device.resize(width, height);

        let output_size = self.settings.render_size(width, height);
        if output_size == self.output_size {
            return;
        }
        log::info!("Resizing render targets to {}x{}", output_size.0, output_size.1);
        self.output_size = output_size;

        let mut ui_renderer = None;
        let old_passes = std::mem::take(&mut self.render_passes);
        for pass in old_passes.into_passes() {
            for handle in pass.owned_images() {
                self.images.schedule_destruction(handle, self.device.frame_count());
            }
            match pass {
                RenderPass::Ui(mut ui_pass) => {
                    ui_renderer = ui_pass.take_ui_renderer();
                    ui_pass.destroy();
                }
                pass => pass.destroy(&mut self.device),
            }
        }

        self.create_render_passes();
        if ui_renderer.is_some() {
            self.set_ui_renderer(ui_renderer);
        }
    }
}

// destroy
impl Renderer {
    pub fn destroy(self) {
        let _span = tracy_client::span!("Renderer::destroy");
        log::info!("destroying renderer");
        self.device.wait_gpu_idle();

        let Self {
            settings: _,
            start_time: _,
            output_size: _,
            mut device,
            static_mesh_store,
            per_frame_data: _,
            per_frame_data_buffers,
            camera_matrix_buffers,
            lights: _,
            light_buffers,
            material_arena: _,
            material_device_buffers,
            model_matrix_buffers,
            mut images,
            num_texture_slots: _,
            upload_slots: _,
            make_image_opaque_pipeline,
            raytracing_scene,
            render_passes,
            ..
        } = self;

        render_passes.destroy(&mut device);
        static_mesh_store.destroy(&mut device);

        drop(images.drain_all());
        drop(raytracing_scene);
        drop(make_image_opaque_pipeline);
        drop(per_frame_data_buffers);
        drop(camera_matrix_buffers);
        drop(light_buffers);
        drop(material_device_buffers);
        drop(model_matrix_buffers);

        device.destroy();
    }
}

/// 纹理数组的大小不能超过 heap 的容量
fn texture_table_size(requested: u32, heap_capacity: u32) -> u32 {
    if requested > heap_capacity {
        log::warn!(
            "max_num_textures {} exceeds the resource heap capacity {}, clamping",
            requested,
            heap_capacity
        );
    }
    requested.min(heap_capacity).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_covers_partial_tiles() {
        assert_eq!(dispatch_group_count(32, 32), UVec3::new(4, 4, 1));
        assert_eq!(dispatch_group_count(33, 1), UVec3::new(5, 1, 1));
        assert_eq!(dispatch_group_count(1, 1), UVec3::new(1, 1, 1));
    }

    #[test]
    fn test_only_changed_texture_slots_are_written() {
        let table = [Some(100u64), None, Some(102), Some(103)];
        let lookup = |index: u32| table.get(index as usize).copied().flatten();

        // 未变化的 0 号与 3 号槽位不会被重写，空位使用 fallback
        let writes = texture_table_writes(&[1, 2], lookup, Some(7), 16);
        assert_eq!(writes, vec![(1, 7), (2, 102)]);
        assert!(texture_table_writes(&[], lookup, Some(7), 16).is_empty());
    }

    #[test]
    fn test_texture_table_writes_skip_out_of_range_and_missing_fallback() {
        let table = [Some(100u64), None, Some(102)];
        let lookup = |index: u32| table.get(index as usize).copied().flatten();

        assert_eq!(texture_table_writes(&[0, 1, 2], lookup, None, 16), vec![(0, 100), (2, 102)]);
        assert_eq!(texture_table_writes(&[0, 2], lookup, Some(7), 2), vec![(0, 100)]);
    }

    #[test]
    fn test_texture_table_is_clamped_to_heap() {
        assert_eq!(texture_table_size(65536, 1024), 1024);
        assert_eq!(texture_table_size(16, 1024), 16);
        assert_eq!(texture_table_size(0, 1024), 1);
    }
}
