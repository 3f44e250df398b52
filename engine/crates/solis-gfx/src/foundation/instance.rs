use std::collections::HashSet;
use std::ffi::{CStr, CString, c_char};

use ash::vk;
use itertools::Itertools;

use crate::foundation::debug_messenger::GfxDebugMessenger;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct GfxInstance {
    /// 仅仅是函数指针和一个裸 handle，生命周期由 destroy 手动控制
    pub(crate) ash_instance: ash::Instance,
    validation_enabled: bool,
}

// new & init
impl GfxInstance {
    /// 设置所需的 layers 和 extensions，创建 vk instance
    ///
    /// `surface_exts` 由 ash_window 根据窗口系统给出
    pub fn new(entry: &ash::Entry, app_name: &str, surface_exts: &[*const c_char], enable_validation: bool) -> Self {
        let _span = tracy_client::span!("GfxInstance::new");

        let app_name = CString::new(app_name).unwrap_or_default();
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3)
            .application_name(app_name.as_c_str())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"Solis")
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let extensions = Self::get_extensions(entry, surface_exts);
        log::info!(
            "instance extensions: {}",
            extensions.iter().map(|e| format!("\n\t{:?}", unsafe { CStr::from_ptr(*e) })).join("")
        );

        // validation layer 只在 debug 配置下开启，不支持时仅给出警告
        let layers = if enable_validation { Self::get_validation_layers(entry) } else { vec![] };
        let validation_enabled = !layers.is_empty();
        log::info!("validation layer enabled: {}", validation_enabled);

        let mut debug_ci = GfxDebugMessenger::create_info();
        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers)
            .push_next(&mut debug_ci);

        let ash_instance = unsafe { entry.create_instance(&instance_ci, None) }
            .unwrap_or_else(|e| panic!("Could not create the Vulkan instance: {e:?}"));

        Self {
            ash_instance,
            validation_enabled,
        }
    }

    fn get_extensions(entry: &ash::Entry, surface_exts: &[*const c_char]) -> Vec<*const c_char> {
        let supported = unsafe { entry.enumerate_instance_extension_properties(None) }
            .unwrap_or_else(|e| panic!("Could not enumerate instance extensions: {e:?}"));
        let is_supported = |ext: &CStr| {
            supported.iter().any(|props| unsafe { CStr::from_ptr(props.extension_name.as_ptr()) } == ext)
        };

        let mut enabled: HashSet<&CStr> = HashSet::new();
        let required = surface_exts
            .iter()
            .map(|ptr| unsafe { CStr::from_ptr(*ptr) })
            .chain(std::iter::once(ash::ext::debug_utils::NAME));
        for ext in required {
            if !is_supported(ext) {
                panic!("Required instance extension ({:?}) is missing", ext);
            }
            enabled.insert(ext);
        }

        enabled.into_iter().map(CStr::as_ptr).collect_vec()
    }

    fn get_validation_layers(entry: &ash::Entry) -> Vec<*const c_char> {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let found =
            layers.iter().any(|props| unsafe { CStr::from_ptr(props.layer_name.as_ptr()) } == VALIDATION_LAYER);
        if found {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            log::warn!("{:?} is not installed, running without validation", VALIDATION_LAYER);
            vec![]
        }
    }
}

// getters
impl GfxInstance {
    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.ash_instance
    }

    #[inline]
    pub fn validation_enabled(&self) -> bool {
        self.validation_enabled
    }
}

// destroy
impl GfxInstance {
    pub fn destroy(self) {
        log::info!("destroying instance");
        unsafe {
            self.ash_instance.destroy_instance(None);
        }
    }
}
