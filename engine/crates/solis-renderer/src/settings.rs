use std::path::Path;

use anyhow::Context;
use solis_gfx::render_device::RenderDeviceSettings;

/// 渲染器的配置，从 `solis.toml` 中读取，缺失的字段使用默认值
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// frames in flight 的数量，覆盖 `device.num_frames`
    pub num_frames: u32,
    /// 内部渲染分辨率相对于窗口大小的比例
    pub render_scale: f32,
    pub enable_raytracing: bool,

    pub max_num_cameras: u32,
    pub max_num_lights: u32,
    pub max_num_textures: u32,
    pub max_model_matrices: u32,

    /// 字节数
    pub material_buffer_size: u64,
    /// 字节数
    pub static_mesh_vertex_buffer_size: u64,
    /// 字节数
    pub static_mesh_index_buffer_size: u64,

    /// 相对于 `resources/` 目录，文件不存在时使用随机生成的噪声
    pub noise_texture_path: String,

    pub device: RenderDeviceSettings,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            num_frames: 3,
            render_scale: 1.0,
            enable_raytracing: true,

            max_num_cameras: 16,
            max_num_lights: 32,
            max_num_textures: 65536,
            max_model_matrices: 65536,

            material_buffer_size: 64 << 20,
            static_mesh_vertex_buffer_size: 64 << 20,
            static_mesh_index_buffer_size: 16 << 20,

            noise_texture_path: "textures/noise.png".to_string(),

            device: RenderDeviceSettings::default(),
        }
    }
}

// new & init
impl RendererSettings {
    pub fn try_load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read renderer settings '{}'", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Could not parse renderer settings '{}'", path.display()))
    }

    /// 文件不存在或者格式错误时使用默认值
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(settings) => {
                log::info!("Loaded renderer settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::warn!("{:#}, using default renderer settings", e);
                Self::default()
            }
        }
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str::<Self>(text)?.sanitized())
    }
}

// tools
impl RendererSettings {
    /// 传给 RenderDevice 的设置，frames in flight 的数量以渲染器为准
    pub fn device_settings(&self) -> RenderDeviceSettings {
        RenderDeviceSettings {
            num_frames: self.num_frames,
            ..self.device.clone()
        }
    }

    /// 按照 render scale 缩放窗口大小，至少为 1x1
    pub fn render_size(&self, window_width: u32, window_height: u32) -> (u32, u32) {
        let scale = |v: u32| ((v as f32 * self.render_scale).round() as u32).max(1);
        (scale(window_width), scale(window_height))
    }

    fn sanitized(mut self) -> Self {
        if self.num_frames == 0 {
            log::warn!("num_frames must be at least 1, using 1");
            self.num_frames = 1;
        }
        if self.render_scale.is_nan() || self.render_scale <= 0.0 {
            log::warn!("Invalid render_scale {}, using 1.0", self.render_scale);
            self.render_scale = 1.0;
        }
        self.max_num_cameras = self.max_num_cameras.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings = RendererSettings::from_toml(
            r#"
            num_frames = 2
            enable_raytracing = false
            max_num_lights = 8

            [device]
            enable_validation = true
            present_mode = "Mailbox"
            "#,
        )
        .unwrap();

        assert_eq!(settings.num_frames, 2);
        assert!(!settings.enable_raytracing);
        assert_eq!(settings.max_num_lights, 8);
        assert_eq!(settings.max_num_textures, 65536);
        assert_eq!(settings.render_scale, 1.0);
        assert!(settings.device.enable_validation);
        assert_eq!(settings.device.max_depth_stencil_views, 32);

        // 渲染器的 num_frames 覆盖 device 的设置
        assert_eq!(settings.device.num_frames, 3);
        assert_eq!(settings.device_settings().num_frames, 2);
    }

    #[test]
    fn test_invalid_values_are_sanitized() {
        let settings = RendererSettings::from_toml("num_frames = 0\nrender_scale = -2.0").unwrap();
        assert_eq!(settings.num_frames, 1);
        assert_eq!(settings.render_scale, 1.0);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(RendererSettings::from_toml("num_frames = \"three\"").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let path = Path::new("/definitely/not/here/solis.toml");
        assert!(RendererSettings::try_load(path).is_err());
        assert_eq!(RendererSettings::load(path), RendererSettings::default());
    }

    #[test]
    fn test_render_size() {
        let settings = RendererSettings {
            render_scale: 0.5,
            ..Default::default()
        };
        assert_eq!(settings.render_size(1920, 1080), (960, 540));
        assert_eq!(settings.render_size(1, 1), (1, 1));
    }
}
