//! 渲染器初始化时创建的内置纹理与 cube mesh

use std::path::Path;

use anyhow::Context;
use rand::Rng;
use rayon::prelude::*;
use solis_gfx::resources::vertex::StandardVertex;

/// RGBA8 像素数据
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub const PINK_TEXTURE_SIZE: u32 = 32;
/// 小端序下为 (255, 0, 255, 255)
pub const PINK_TEXTURE_COLOR: u32 = 0xFFFF00FF;

pub const NOISE_TEXTURE_SIZE: u32 = 256;

pub const DEFAULT_NORMAL_ROUGHNESS: [f32; 4] = [0.5, 0.5, 1.0, 0.5];
pub const DEFAULT_SPECULAR_COLOR_EMISSION: [f32; 4] = [0.04, 0.04, 0.04, 0.0];

/// 默认纹理的大小
pub const DEFAULT_TEXTURE_SIZE: u32 = 8;

#[inline]
pub fn unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub fn solid_color(width: u32, height: u32, rgba: [u8; 4]) -> ImageData {
    ImageData {
        width,
        height,
        pixels: rgba.repeat((width * height) as usize),
    }
}

/// 加载失败的纹理使用的替代纹理
pub fn pink_texture() -> ImageData {
    solid_color(PINK_TEXTURE_SIZE, PINK_TEXTURE_SIZE, PINK_TEXTURE_COLOR.to_le_bytes())
}

pub fn default_normal_roughness_texture() -> ImageData {
    solid_color(DEFAULT_TEXTURE_SIZE, DEFAULT_TEXTURE_SIZE, DEFAULT_NORMAL_ROUGHNESS.map(unorm8))
}

pub fn default_specular_color_emission_texture() -> ImageData {
    solid_color(DEFAULT_TEXTURE_SIZE, DEFAULT_TEXTURE_SIZE, DEFAULT_SPECULAR_COLOR_EMISSION.map(unorm8))
}

pub fn load_rgba8(path: &Path) -> anyhow::Result<ImageData> {
    let _span = tracy_client::span!("load_rgba8");
    let image = image::open(path).with_context(|| format!("Could not load image '{}'", path.display()))?.to_rgba8();
    Ok(ImageData {
        width: image.width(),
        height: image.height(),
        pixels: image.into_raw(),
    })
}

/// 每一行使用各自线程的随机数生成器
pub fn random_noise(width: u32, height: u32) -> ImageData {
    let _span = tracy_client::span!("random_noise");
    let mut pixels = vec![0u8; (width * height * 4) as usize];
    pixels.par_chunks_mut((width * 4).max(1) as usize).for_each(|row| rand::thread_rng().fill(row));
    ImageData { width, height, pixels }
}

/// 优先从文件加载，否则随机生成
pub fn noise_texture(path: &Path) -> ImageData {
    if path.exists() {
        match load_rgba8(path) {
            Ok(data) => return data,
            Err(e) => log::warn!("{:#}, generating a random noise texture instead", e),
        }
    } else {
        log::info!("Noise texture {} does not exist, generating one", path.display());
    }
    random_noise(NOISE_TEXTURE_SIZE, NOISE_TEXTURE_SIZE)
}

const CUBE_COLOR: u32 = 0xFFCDCDCD;

const fn cube_vertex(position: [f32; 3], normal: [f32; 3]) -> StandardVertex {
    StandardVertex {
        position,
        normal,
        color: CUBE_COLOR,
        material_idx: 0,
        texcoord: [0.0, 0.0],
    }
}

/// 边长为 1，中心在原点
pub const CUBE_VERTICES: [StandardVertex; 24] = [
    // front
    cube_vertex([-0.5, 0.5, 0.5], [0.0, 0.0, 1.0]),
    cube_vertex([0.5, -0.5, 0.5], [0.0, 0.0, 1.0]),
    cube_vertex([-0.5, -0.5, 0.5], [0.0, 0.0, 1.0]),
    cube_vertex([0.5, 0.5, 0.5], [0.0, 0.0, 1.0]),
    // left
    cube_vertex([-0.5, -0.5, -0.5], [-1.0, 0.0, 0.0]),
    cube_vertex([-0.5, 0.5, 0.5], [-1.0, 0.0, 0.0]),
    cube_vertex([-0.5, -0.5, 0.5], [-1.0, 0.0, 0.0]),
    cube_vertex([-0.5, 0.5, -0.5], [-1.0, 0.0, 0.0]),
    // right
    cube_vertex([0.5, 0.5, 0.5], [1.0, 0.0, 0.0]),
    cube_vertex([0.5, -0.5, -0.5], [1.0, 0.0, 0.0]),
    cube_vertex([0.5, -0.5, 0.5], [1.0, 0.0, 0.0]),
    cube_vertex([0.5, 0.5, -0.5], [1.0, 0.0, 0.0]),
    // back
    cube_vertex([0.5, 0.5, -0.5], [0.0, 0.0, -1.0]),
    cube_vertex([-0.5, -0.5, -0.5], [0.0, 0.0, -1.0]),
    cube_vertex([0.5, -0.5, -0.5], [0.0, 0.0, -1.0]),
    cube_vertex([-0.5, 0.5, -0.5], [0.0, 0.0, -1.0]),
    // top
    cube_vertex([-0.5, 0.5, -0.5], [0.0, 1.0, 0.0]),
    cube_vertex([0.5, 0.5, 0.5], [0.0, 1.0, 0.0]),
    cube_vertex([0.5, 0.5, -0.5], [0.0, 1.0, 0.0]),
    cube_vertex([-0.5, 0.5, 0.5], [0.0, 1.0, 0.0]),
    // bottom
    cube_vertex([0.5, -0.5, 0.5], [0.0, -1.0, 0.0]),
    cube_vertex([-0.5, -0.5, -0.5], [0.0, -1.0, 0.0]),
    cube_vertex([0.5, -0.5, -0.5], [0.0, -1.0, 0.0]),
    cube_vertex([-0.5, -0.5, 0.5], [0.0, -1.0, 0.0]),
];

#[rustfmt::skip]
pub const CUBE_INDICES: [u32; 36] = [
    0, 1, 2, 0, 3, 1,       // front
    4, 5, 6, 4, 7, 5,       // left
    8, 9, 10, 8, 11, 9,     // right
    12, 13, 14, 12, 15, 13, // back
    16, 18, 17, 16, 17, 19, // top
    20, 22, 21, 20, 21, 23, // bottom
];

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_pink_texture() {
        let pink = pink_texture();
        assert_eq!((pink.width, pink.height), (32, 32));
        assert_eq!(pink.pixels.len(), 32 * 32 * 4);
        assert_eq!(&pink.pixels[..4], &[255, 0, 255, 255]);
        assert!(pink.pixels.chunks(4).all(|p| p == [255, 0, 255, 255]));
    }

    #[test]
    fn test_default_material_textures() {
        assert_eq!(&default_normal_roughness_texture().pixels[..4], &[128, 128, 255, 128]);
        assert_eq!(&default_specular_color_emission_texture().pixels[..4], &[10, 10, 10, 0]);
    }

    #[test]
    fn test_random_noise_size() {
        let noise = random_noise(16, 8);
        assert_eq!(noise.pixels.len(), 16 * 8 * 4);
        // 512 个随机字节全部为 0 的概率可以忽略
        assert!(noise.pixels.iter().any(|b| *b != 0));
    }

    #[test]
    fn test_missing_noise_file_generates_noise() {
        let noise = noise_texture(Path::new("/definitely/not/here/noise.png"));
        assert_eq!((noise.width, noise.height), (NOISE_TEXTURE_SIZE, NOISE_TEXTURE_SIZE));
    }

    /// viewport 翻转了 y 轴，从外部看每个三角形都是顺时针
    #[test]
    fn test_cube_faces_are_clockwise_from_outside() {
        for triangle in CUBE_INDICES.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| Vec3::from(CUBE_VERTICES[triangle[i] as usize].position));
            let normal = Vec3::from(CUBE_VERTICES[triangle[0] as usize].normal);
            let winding = (b - a).cross(c - a).normalize();
            assert!(winding.dot(normal) < -0.99, "triangle {:?} has the wrong winding", triangle);
        }
    }
}
