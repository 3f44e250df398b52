use std::ffi::CStr;

use ash::vk;
use itertools::Itertools;

use crate::foundation::debug_messenger::DebugType;

pub const INTEL_VENDOR_ID: u32 = 0x8086;

#[derive(Clone, Debug)]
pub struct GfxQueueFamily {
    pub name: String,
    pub queue_family_index: u32,
    pub queue_flags: vk::QueueFlags,
    pub queue_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterType {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}
impl From<vk::PhysicalDeviceType> for AdapterType {
    fn from(value: vk::PhysicalDeviceType) -> Self {
        match value {
            vk::PhysicalDeviceType::DISCRETE_GPU => Self::Discrete,
            vk::PhysicalDeviceType::INTEGRATED_GPU => Self::Integrated,
            vk::PhysicalDeviceType::VIRTUAL_GPU => Self::Virtual,
            vk::PhysicalDeviceType::CPU => Self::Cpu,
            _ => Self::Other,
        }
    }
}

/// 选择 adapter 时需要的信息，和具体的 vk handle 无关
#[derive(Clone, Debug)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor_id: u32,
    pub adapter_type: AdapterType,
    pub api_version: u32,
    /// runtime descriptor array + partially bound + update after bind
    pub supports_descriptor_indexing: bool,
    pub supports_raytracing: bool,
}
impl AdapterInfo {
    /// 集成显卡和 CPU 共享内存
    #[inline]
    pub fn is_uma(&self) -> bool {
        self.adapter_type == AdapterType::Integrated
    }

    fn score(&self) -> u32 {
        let type_score = match self.adapter_type {
            AdapterType::Discrete => 1000,
            AdapterType::Integrated => 100,
            AdapterType::Virtual => 10,
            AdapterType::Cpu | AdapterType::Other => 1,
        };
        type_score + if self.supports_raytracing { 50 } else { 0 }
    }
}

/// 从所有 adapter 中选出最合适的一个，返回其下标
///
/// - 存在多个 adapter 时跳过 Intel
/// - 不支持完整 descriptor indexing 的 adapter 被拒绝
/// - API 版本低于 1.3 的 adapter 被拒绝
/// - 剩下的 adapter 中优先独立显卡
pub fn score_adapters(adapters: &[AdapterInfo]) -> Option<usize> {
    let multiple_adapters = adapters.len() > 1;

    adapters
        .iter()
        .enumerate()
        .filter(|(_, adapter)| {
            if multiple_adapters && adapter.vendor_id == INTEL_VENDOR_ID {
                log::info!("Skipping adapter {} - Intel adapters are only used as a last resort", adapter.name);
                return false;
            }
            if !adapter.supports_descriptor_indexing {
                log::warn!(
                    "Ignoring adapter {} - Doesn't have the flexible resource binding that Solis needs",
                    adapter.name
                );
                return false;
            }
            if adapter.api_version < vk::API_VERSION_1_3 {
                log::warn!("Ignoring adapter {} - Doesn't support Vulkan 1.3", adapter.name);
                return false;
            }
            true
        })
        // 分数相同时保留先枚举到的
        .rev()
        .max_by_key(|(_, adapter)| adapter.score())
        .map(|(idx, _)| idx)
}

/// 表示一张物理显卡
pub struct GfxPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,
    pub(crate) info: AdapterInfo,

    pub(crate) basic_props: vk::PhysicalDeviceProperties,
    pub(crate) acc_struct_props: vk::PhysicalDeviceAccelerationStructurePropertiesKHR<'static>,

    pub(crate) gfx_queue_family: GfxQueueFamily,
    pub(crate) transfer_queue_family: Option<GfxQueueFamily>,
}

// new & init
impl GfxPhysicalDevice {
    /// 枚举所有 gpu，按规则打分后选择一个
    ///
    /// 找不到合适的 adapter 时直接 panic
    pub fn select(instance: &ash::Instance) -> Self {
        let _span = tracy_client::span!("GfxPhysicalDevice::select");

        let pdevices = unsafe { instance.enumerate_physical_devices() }
            .unwrap_or_else(|e| panic!("Could not enumerate Vulkan adapters: {e:?}"));
        let mut candidates = pdevices.iter().map(|pdevice| Self::new(instance, *pdevice)).collect_vec();
        let infos = candidates.iter().map(|c| c.info.clone()).collect_vec();

        let Some(idx) = score_adapters(&infos) else {
            panic!("Could not find a suitable Vulkan adapter");
        };

        let chosen = candidates.swap_remove(idx);
        log::info!(
            "using adapter {} (uma: {}, raytracing: {})",
            chosen.info.name,
            chosen.info.is_uma(),
            chosen.info.supports_raytracing
        );
        chosen
    }

    fn new(instance: &ash::Instance, pdevice: vk::PhysicalDevice) -> Self {
        unsafe {
            let mut acc_props = vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
            let mut props2 = vk::PhysicalDeviceProperties2::default().push_next(&mut acc_props);
            instance.get_physical_device_properties2(pdevice, &mut props2);
            let basic_props = props2.properties;
            acc_props.p_next = std::ptr::null_mut();

            let name = CStr::from_ptr(basic_props.device_name.as_ptr()).to_string_lossy().to_string();
            log::info!("found gpu: {}", name);

            let mut indexing_features = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
            let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut indexing_features);
            instance.get_physical_device_features2(pdevice, &mut features2);
            let supports_descriptor_indexing = indexing_features.runtime_descriptor_array == vk::TRUE
                && indexing_features.descriptor_binding_partially_bound == vk::TRUE
                && indexing_features.descriptor_binding_sampled_image_update_after_bind == vk::TRUE
                && indexing_features.descriptor_binding_storage_image_update_after_bind == vk::TRUE;

            let device_exts = instance.enumerate_device_extension_properties(pdevice).unwrap_or_default();
            let has_ext = |ext: &CStr| {
                device_exts.iter().any(|props| CStr::from_ptr(props.extension_name.as_ptr()) == ext)
            };
            let supports_raytracing = has_ext(ash::khr::acceleration_structure::NAME)
                && has_ext(ash::khr::ray_query::NAME)
                && has_ext(ash::khr::deferred_host_operations::NAME);

            let queue_family_props = instance.get_physical_device_queue_family_properties(pdevice);
            let find_queue_family = |name: &str, include: vk::QueueFlags, exclude: vk::QueueFlags| {
                queue_family_props
                    .iter()
                    .enumerate()
                    .find(|(_, props)| props.queue_flags.contains(include) && (props.queue_flags & exclude).is_empty())
                    .map(|(idx, props)| GfxQueueFamily {
                        name: name.to_string(),
                        queue_family_index: idx as u32,
                        queue_flags: props.queue_flags,
                        queue_count: props.queue_count,
                    })
            };

            // 全能的 Queue：graphics, compute, transfer
            let gfx_queue_family = find_queue_family(
                "gfx",
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                vk::QueueFlags::empty(),
            )
            .unwrap_or_else(|| panic!("Adapter {} has no graphics queue", name));
            // DMA 专用的 Queue
            let transfer_queue_family =
                find_queue_family("copy", vk::QueueFlags::TRANSFER, vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE);

            Self {
                vk_handle: pdevice,
                info: AdapterInfo {
                    name,
                    vendor_id: basic_props.vendor_id,
                    adapter_type: basic_props.device_type.into(),
                    api_version: basic_props.api_version,
                    supports_descriptor_indexing,
                    supports_raytracing,
                },
                basic_props,
                acc_struct_props: acc_props,
                gfx_queue_family,
                transfer_queue_family,
            }
        }
    }
}

// getters
impl GfxPhysicalDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::PhysicalDevice {
        self.vk_handle
    }

    #[inline]
    pub fn info(&self) -> &AdapterInfo {
        &self.info
    }

    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.basic_props.limits
    }

    #[inline]
    pub fn min_acceleration_scratch_alignment(&self) -> u32 {
        self.acc_struct_props.min_acceleration_structure_scratch_offset_alignment
    }

    #[inline]
    pub fn gfx_queue_family(&self) -> &GfxQueueFamily {
        &self.gfx_queue_family
    }
}

impl DebugType for GfxPhysicalDevice {
    fn debug_type_name() -> &'static str {
        "GfxPhysicalDevice"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(name: &str, vendor_id: u32, adapter_type: AdapterType) -> AdapterInfo {
        AdapterInfo {
            name: name.to_string(),
            vendor_id,
            adapter_type,
            api_version: vk::API_VERSION_1_3,
            supports_descriptor_indexing: true,
            supports_raytracing: false,
        }
    }

    #[test]
    fn test_prefer_discrete() {
        let adapters = [
            adapter("igpu", 0x1002, AdapterType::Integrated),
            adapter("dgpu", 0x10de, AdapterType::Discrete),
        ];
        assert_eq!(score_adapters(&adapters), Some(1));
    }

    #[test]
    fn test_skip_intel_when_multiple() {
        let adapters = [
            adapter("intel", INTEL_VENDOR_ID, AdapterType::Discrete),
            adapter("amd", 0x1002, AdapterType::Integrated),
        ];
        assert_eq!(score_adapters(&adapters), Some(1));
    }

    #[test]
    fn test_single_intel_is_accepted() {
        let adapters = [adapter("intel", INTEL_VENDOR_ID, AdapterType::Integrated)];
        assert_eq!(score_adapters(&adapters), Some(0));
    }

    #[test]
    fn test_reject_without_descriptor_indexing() {
        let mut a = adapter("old", 0x10de, AdapterType::Discrete);
        a.supports_descriptor_indexing = false;
        assert_eq!(score_adapters(&[a]), None);
    }

    #[test]
    fn test_reject_old_api_version() {
        let mut a = adapter("old", 0x10de, AdapterType::Discrete);
        a.api_version = vk::API_VERSION_1_2;
        assert_eq!(score_adapters(&[a]), None);
    }

    #[test]
    fn test_tie_keeps_first() {
        let adapters = [
            adapter("first", 0x10de, AdapterType::Discrete),
            adapter("second", 0x10de, AdapterType::Discrete),
        ];
        assert_eq!(score_adapters(&adapters), Some(0));
    }

    #[test]
    fn test_uma() {
        assert!(adapter("igpu", 0x1002, AdapterType::Integrated).is_uma());
        assert!(!adapter("dgpu", 0x1002, AdapterType::Discrete).is_uma());
    }
}
