use std::ffi::{CStr, CString};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;
use itertools::Itertools;

use crate::foundation::debug_messenger::DebugType;
use crate::foundation::physical_device::GfxPhysicalDevice;

/// Vulkan 逻辑设备封装
///
/// 包含核心设备 API 以及各种扩展的函数指针。
/// 这些函数指针在应用生命周期中保持不变，通过 `Arc` 在各个对象以及 completion 线程之间共享。
///
/// # 扩展支持
/// - Swapchain (KHR)
/// - Push Descriptor (KHR)：用于 root descriptor
/// - Acceleration Structure / Ray Query (KHR)：仅当 adapter 支持时开启
/// - Debug Utils (EXT)
pub struct GfxDevice {
    pub(crate) device: ash::Device,
    pub(crate) swapchain: ash::khr::swapchain::Device,
    pub(crate) push_descriptor: ash::khr::push_descriptor::Device,
    pub(crate) acceleration_structure: ash::khr::acceleration_structure::Device,
    pub(crate) debug_utils: ash::ext::debug_utils::Device,

    raytracing_enabled: bool,
    destroyed: AtomicBool,
}

// new & init
impl GfxDevice {
    pub fn new(
        instance: &ash::Instance,
        pdevice: &GfxPhysicalDevice,
        queue_create_infos: &[vk::DeviceQueueCreateInfo],
    ) -> Self {
        let _span = tracy_client::span!("GfxDevice::new");

        let raytracing_enabled = pdevice.info().supports_raytracing;
        let device_exts = Self::device_exts(raytracing_enabled).iter().map(|e| e.as_ptr()).collect_vec();
        log::info!(
            "device exts: {}",
            device_exts.iter().map(|e| format!("\n\t{:?}", unsafe { CStr::from_ptr(*e) })).join("")
        );

        // 将所有的 extension features 串到 PhysicalDeviceFeatures2 的 p_next 上
        let mut all_features = vk::PhysicalDeviceFeatures2::default().features(Self::basic_features());
        let mut extra_features = Self::extra_features(raytracing_enabled);
        unsafe {
            extra_features.iter_mut().for_each(|f| {
                let ptr = <*mut dyn vk::ExtendsPhysicalDeviceFeatures2>::cast::<vk::BaseOutStructure>(f.as_mut());
                (*ptr).p_next = all_features.p_next as _;
                all_features.p_next = ptr as _;
            });
        }

        let device_ci = vk::DeviceCreateInfo::default()
            .queue_create_infos(queue_create_infos)
            .enabled_extension_names(&device_exts)
            .push_next(&mut all_features);

        let device = unsafe { instance.create_device(pdevice.vk_handle(), &device_ci, None) }
            .unwrap_or_else(|e| panic!("Could not create the Vulkan device: {e:?}"));

        Self {
            swapchain: ash::khr::swapchain::Device::new(instance, &device),
            push_descriptor: ash::khr::push_descriptor::Device::new(instance, &device),
            acceleration_structure: ash::khr::acceleration_structure::Device::new(instance, &device),
            debug_utils: ash::ext::debug_utils::Device::new(instance, &device),
            device,

            raytracing_enabled,
            destroyed: AtomicBool::new(false),
        }
    }

    fn basic_features() -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .fragment_stores_and_atomics(true)
            .independent_blend(true)
            .shader_int64(true) // 用于 buffer device address
    }

    fn extra_features(raytracing: bool) -> Vec<Box<dyn vk::ExtendsPhysicalDeviceFeatures2>> {
        let mut features: Vec<Box<dyn vk::ExtendsPhysicalDeviceFeatures2>> = vec![
            Box::new(
                vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true).synchronization2(true),
            ),
            Box::new(
                vk::PhysicalDeviceVulkan12Features::default()
                    .buffer_device_address(true)
                    .timeline_semaphore(true)
                    .scalar_block_layout(true)
                    .uniform_buffer_standard_layout(true)
                    .descriptor_indexing(true)
                    .runtime_descriptor_array(true)
                    // 即使一些 descriptor 是 invalid
                    .descriptor_binding_partially_bound(true)
                    .descriptor_binding_sampled_image_update_after_bind(true)
                    .descriptor_binding_storage_image_update_after_bind(true)
                    .descriptor_binding_storage_buffer_update_after_bind(true)
                    .descriptor_binding_update_unused_while_pending(true)
                    .shader_sampled_image_array_non_uniform_indexing(true),
            ),
            Box::new(vk::PhysicalDeviceShaderDrawParametersFeatures::default().shader_draw_parameters(true)),
        ];
        if raytracing {
            features.push(Box::new(
                vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default().acceleration_structure(true),
            ));
            features.push(Box::new(vk::PhysicalDeviceRayQueryFeaturesKHR::default().ray_query(true)));
        }
        features
    }

    fn device_exts(raytracing: bool) -> Vec<&'static CStr> {
        let mut exts = vec![ash::khr::swapchain::NAME, ash::khr::push_descriptor::NAME];
        if raytracing {
            exts.extend([
                ash::khr::acceleration_structure::NAME,
                ash::khr::ray_query::NAME,
                ash::khr::deferred_host_operations::NAME,
            ]);
        }
        exts
    }
}

// getters
impl GfxDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::Device {
        self.device.handle()
    }

    #[inline]
    pub fn raytracing_enabled(&self) -> bool {
        self.raytracing_enabled
    }

    #[inline]
    pub fn swapchain(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain
    }

    #[inline]
    pub fn push_descriptor(&self) -> &ash::khr::push_descriptor::Device {
        &self.push_descriptor
    }

    #[inline]
    pub fn acceleration_structure(&self) -> &ash::khr::acceleration_structure::Device {
        &self.acceleration_structure
    }

    #[inline]
    pub fn debug_utils(&self) -> &ash::ext::debug_utils::Device {
        &self.debug_utils
    }
}

// tools
impl GfxDevice {
    /// debug name 设置失败不影响运行
    pub fn set_object_debug_name<T: vk::Handle>(&self, handle: T, name: impl AsRef<str>) {
        let Ok(name) = CString::new(name.as_ref()) else {
            return;
        };
        unsafe {
            let _ = self.debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle),
            );
        }
    }

    #[inline]
    pub fn set_debug_name<T: DebugType>(&self, handle: &T, name: impl AsRef<str>) {
        self.set_object_debug_name(handle.vk_handle(), format!("{}::{}", T::debug_type_name(), name.as_ref()));
    }

    #[inline]
    pub fn wait_idle(&self) {
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            log::error!("device_wait_idle failed: {:?}", e);
        }
    }
}

// destroy
impl GfxDevice {
    pub fn destroy(&self) {
        log::info!("destroying device");
        self.destroyed.store(true, Ordering::Release);
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

impl Deref for GfxDevice {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
impl Drop for GfxDevice {
    fn drop(&mut self) {
        debug_assert!(self.destroyed.load(Ordering::Acquire), "GfxDevice must be destroyed before being dropped.");
    }
}
impl DebugType for GfxDevice {
    fn debug_type_name() -> &'static str {
        "GfxDevice"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.device.handle()
    }
}
