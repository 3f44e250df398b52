use std::path::{Path, PathBuf};

/// 统一资源路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
///
/// ```ignore
/// let shader = SolisPath::shader_build_path("standard.vertex"); // shader/.build/standard.vertex.spv
/// let noise = SolisPath::resources_path("textures/noise.png");  // resources/textures/noise.png
/// ```
pub struct SolisPath {}
impl SolisPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        // solis-crate-tools 位于 workspace 根目录下
        Path::new(env!("CARGO_MANIFEST_DIR")).parent().map(Path::to_path_buf).unwrap_or_default()
    }

    /// `resources/` 目录下的文件
    pub fn resources_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("resources").join(filename)
    }

    /// `shader/` 目录，包含 `src/`，`include/` 和编译输出 `.build/`
    pub fn shader_root_path() -> PathBuf {
        Self::workspace_path().join("shader")
    }

    /// `shader/.build/` 目录下编译好的 SPIR-V
    pub fn shader_build_path(name: &str) -> PathBuf {
        Self::shader_root_path().join(".build").join(format!("{name}.spv"))
    }

    /// 渲染设置文件
    pub fn settings_path() -> PathBuf {
        Self::workspace_path().join("solis.toml")
    }
}

/// 读取 shader 字节码
///
/// 文件不存在时返回空的 Vec 并输出错误日志，后续用空的字节码创建 pipeline 会失败
pub fn load_shader(name: &str) -> Vec<u8> {
    load_shader_from(&SolisPath::shader_build_path(name))
}

pub fn load_shader_from(path: &Path) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("Could not open shader file '{}': {}", path.display(), e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_shader_is_empty() {
        let bytes = load_shader("definitely/not/a/shader");
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_load_shader_from_file() {
        let path = std::env::temp_dir().join("solis_load_shader_test.spv");
        std::fs::write(&path, [0x03u8, 0x02, 0x23, 0x07]).unwrap();
        assert_eq!(load_shader_from(&path), vec![0x03, 0x02, 0x23, 0x07]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_shader_build_path() {
        let path = SolisPath::shader_build_path("standard.vertex");
        assert!(path.ends_with("shader/.build/standard.vertex.spv"));
        assert!(path.starts_with(SolisPath::workspace_path()));
    }
}
