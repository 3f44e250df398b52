use std::sync::Arc;

use ash::vk;

use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;

pub struct GfxSamplerCreateInfo {
    inner: vk::SamplerCreateInfo<'static>,
}

impl Default for GfxSamplerCreateInfo {
    fn default() -> Self {
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE);

        Self { inner: sampler_info }
    }
}

impl GfxSamplerCreateInfo {
    /// 默认配置：linear，repeat
    #[inline]
    pub fn linear() -> Self {
        Self::default()
    }

    #[inline]
    pub fn point() -> Self {
        let mut info = Self::default();
        info.inner = info
            .inner
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST);
        info
    }

    #[inline]
    pub fn anisotropic(max_anisotropy: f32) -> Self {
        let mut info = Self::default();
        info.inner = info.inner.anisotropy_enable(true).max_anisotropy(max_anisotropy);
        info
    }
}

/// # Destroy
/// 需要手动调用 `destroy`
pub struct GfxSampler {
    handle: vk::Sampler,
    device: Arc<GfxDevice>,
}
impl DebugType for GfxSampler {
    fn debug_type_name() -> &'static str {
        "GfxSampler"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl GfxSampler {
    pub fn new(device: Arc<GfxDevice>, info: &GfxSamplerCreateInfo, debug_name: &str) -> Self {
        let handle = unsafe { device.create_sampler(&info.inner, None) }
            .unwrap_or_else(|e| panic!("Could not create sampler {debug_name}: {e:?}"));
        let sampler = Self { handle, device };
        sampler.device.set_debug_name(&sampler, debug_name);
        sampler
    }

    /// 标准的三个 static sampler：point，linear，anisotropic x8
    pub fn standard_samplers(device: &Arc<GfxDevice>) -> [GfxSampler; 3] {
        [
            Self::new(device.clone(), &GfxSamplerCreateInfo::point(), "point"),
            Self::new(device.clone(), &GfxSamplerCreateInfo::linear(), "linear"),
            Self::new(device.clone(), &GfxSamplerCreateInfo::anisotropic(8.0), "aniso8"),
        ]
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }

    pub fn destroy(self) {
        unsafe {
            self.device.destroy_sampler(self.handle, None);
        }
    }
}
