use std::io::Cursor;
use std::sync::Arc;

use ash::vk;

use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;

/// # Destroy
///
/// 需要手动调用 `destroy` 方法来释放资源。
pub struct GfxShaderModule {
    handle: vk::ShaderModule,
    device: Arc<GfxDevice>,

    #[cfg(debug_assertions)]
    destroyed: bool,
}
impl GfxShaderModule {
    /// 字节码为空或者不是合法的 SPIR-V 时返回 None
    pub fn from_bytes(device: Arc<GfxDevice>, bytecode: &[u8], debug_name: &str) -> Option<Self> {
        if bytecode.is_empty() {
            log::error!("Shader {} has no bytecode", debug_name);
            return None;
        }
        let code = match ash::util::read_spv(&mut Cursor::new(bytecode)) {
            Ok(code) => code,
            Err(e) => {
                log::error!("Shader {} is not valid SPIR-V: {}", debug_name, e);
                return None;
            }
        };

        let shader_module_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let handle = match unsafe { device.create_shader_module(&shader_module_info, None) } {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Could not create shader module {}: {:?}", debug_name, e);
                return None;
            }
        };

        let shader_module = Self {
            handle,
            device,

            #[cfg(debug_assertions)]
            destroyed: false,
        };
        shader_module.device.set_debug_name(&shader_module, debug_name);
        Some(shader_module)
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    #[inline]
    pub fn destroy(mut self) {
        unsafe {
            self.device.destroy_shader_module(self.handle, None);
        }
        #[cfg(debug_assertions)]
        {
            self.destroyed = true;
        }
    }
}
impl Drop for GfxShaderModule {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        debug_assert!(self.destroyed, "GfxShaderModule must be destroyed manually before drop.");
    }
}
impl DebugType for GfxShaderModule {
    fn debug_type_name() -> &'static str {
        "GfxShaderModule"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
