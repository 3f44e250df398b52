//! 编译任务：从 shader 源文件名推导 stage 与输出路径
//!
//! 文件命名规则为 `<name>.<stage>.glsl`，编译结果为 `.build/<name>.<stage>.spv`，
//! 与运行时 `load_shader("<name>.<stage>")` 读取的路径一致

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Compute,
}

impl ShaderStage {
    fn from_name(stage: &str) -> Option<Self> {
        match stage {
            "vertex" => Some(Self::Vertex),
            "pixel" => Some(Self::Pixel),
            "compute" => Some(Self::Compute),
            _ => None,
        }
    }

    /// glslc 的 `-fshader-stage` 参数
    pub fn glslc_stage(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Pixel => "frag",
            Self::Compute => "comp",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ShaderCompileTask {
    pub shader_path: PathBuf,
    pub output_path: PathBuf,
    pub stage: ShaderStage,
}

impl ShaderCompileTask {
    /// 不是 `.glsl` 文件，或者 stage 无法识别时返回 None
    pub fn from_path(shader_path: &Path, build_dir: &Path) -> Option<Self> {
        let file_name = shader_path.file_name()?.to_str()?;
        let shader_name = file_name.strip_suffix(".glsl")?;
        let (_, stage) = shader_name.rsplit_once('.')?;
        let stage = ShaderStage::from_name(stage)?;

        Some(Self {
            shader_path: shader_path.to_path_buf(),
            output_path: build_dir.join(format!("{shader_name}.spv")),
            stage,
        })
    }

    pub fn compile(&self, include_dir: &Path) -> bool {
        let output = std::process::Command::new("glslc")
            .arg(format!("-fshader-stage={}", self.stage.glslc_stage()))
            .arg("--target-env=vulkan1.2")
            .arg("-g")
            .arg("-I")
            .arg(include_dir)
            .arg("-o")
            .arg(&self.output_path)
            .arg(&self.shader_path)
            .output();

        match output {
            Ok(output) => {
                if !output.stderr.is_empty() {
                    log::error!("{}: {}", self.shader_path.display(), String::from_utf8_lossy(&output.stderr));
                }
                output.status.success()
            }
            Err(e) => {
                log::error!("Failed to execute glslc: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_from_stage_suffix() {
        let build = Path::new("shader/.build");
        let task = ShaderCompileTask::from_path(Path::new("shader/src/standard.pixel.glsl"), build).unwrap();
        assert_eq!(task.stage, ShaderStage::Pixel);
        assert_eq!(task.output_path, build.join("standard.pixel.spv"));

        let task = ShaderCompileTask::from_path(Path::new("shader/src/make_image_opaque.compute.glsl"), build).unwrap();
        assert_eq!(task.stage.glslc_stage(), "comp");
    }

    #[test]
    fn test_skip_unknown_files() {
        let build = Path::new("shader/.build");
        assert!(ShaderCompileTask::from_path(Path::new("shader/src/readme.md"), build).is_none());
        assert!(ShaderCompileTask::from_path(Path::new("shader/src/common.glsl"), build).is_none());
        assert!(ShaderCompileTask::from_path(Path::new("shader/src/sky.geometry.glsl"), build).is_none());
    }
}
