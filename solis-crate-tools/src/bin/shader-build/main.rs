//! Shader 编译工具
//!
//! 将 `shader/src` 下的所有 GLSL 文件编译为 SPIR-V，输出到 `shader/.build`

mod task;

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use solis_crate_tools::init_log::init_log;
use solis_crate_tools::resource::SolisPath;
use task::ShaderCompileTask;

fn main() {
    init_log();

    let shader_root = SolisPath::shader_root_path();
    let src_dir = shader_root.join("src");
    let include_dir = shader_root.join("include");
    let build_dir = shader_root.join(".build");
    log::info!("Shader source path: {:?}", src_dir);
    log::info!("Shader output path: {:?}", build_dir);

    if let Err(e) = std::fs::create_dir_all(&build_dir) {
        log::error!("Could not create {:?}: {}", build_dir, e);
        std::process::exit(1);
    }

    let failed = AtomicUsize::new(0);
    walkdir::WalkDir::new(&src_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| ShaderCompileTask::from_path(entry.path(), &build_dir))
        .par_bridge()
        .for_each(|task| {
            log::info!("Compiling shader: {:?}", task.shader_path);
            if !task.compile(&include_dir) {
                failed.fetch_add(1, Ordering::Relaxed);
            }
        });

    let failed = failed.into_inner();
    if failed > 0 {
        log::error!("{} shaders failed to compile", failed);
        std::process::exit(1);
    }
    log::info!("Shader compilation completed.");
}
