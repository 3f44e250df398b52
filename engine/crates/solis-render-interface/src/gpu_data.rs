//! 写入 GPU buffer 的数据结构，布局与 shader 中的定义保持一致

use glam::{Mat4, Vec3};

use crate::components::{CameraComponent, TransformComponent};
use crate::handles::TextureHandle;

/// 整个帧内保持不变的数据
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PerFrameData {
    /// 程序启动之后经过的秒数
    pub time_since_start: f32,
    pub frame_count: u32,
    pub render_width: u32,
    pub render_height: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraMatrices {
    pub view: Mat4,
    pub projection: Mat4,
    pub inverse_view: Mat4,
    pub inverse_projection: Mat4,
    /// 上一帧的矩阵，用于 reprojection
    pub previous_view: Mat4,
    pub previous_projection: Mat4,
}

impl Default for CameraMatrices {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
            inverse_projection: Mat4::IDENTITY,
            previous_view: Mat4::IDENTITY,
            previous_projection: Mat4::IDENTITY,
        }
    }
}

impl CameraMatrices {
    /// 相机的缩放不参与 view 矩阵的计算
    pub fn calculate_view_matrix(&mut self, transform: &TransformComponent) {
        self.inverse_view = Mat4::from_rotation_translation(transform.rotation, transform.location);
        self.view = self.inverse_view.inverse();
    }

    /// reversed-z 的无限远透视投影：near plane 的深度为 1，无穷远处为 0
    pub fn calculate_projection_matrix(&mut self, camera: &CameraComponent) {
        let width_over_height = if camera.aspect_ratio > 0.0 { 1.0 / camera.aspect_ratio } else { 1.0 };
        self.projection =
            Mat4::perspective_infinite_reverse_rh(camera.fov.to_radians(), width_over_height, camera.near_clip_plane);
        self.inverse_projection = self.projection.inverse();
    }

    /// 当前的矩阵成为下一帧的 previous 矩阵
    #[inline]
    pub fn copy_matrices_to_previous(&mut self) {
        self.previous_view = self.view;
        self.previous_projection = self.projection;
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LightType {
    #[default]
    Directional = 0,
    Sphere = 1,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Light {
    pub color: [f32; 3],
    /// [`LightType`]
    pub ty: u32,
    /// directional light 的方向，或者 sphere light 的位置
    pub direction_or_location: [f32; 3],
    /// directional light 的角直径，或者 sphere light 的半径
    pub size: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self::directional(Vec3::ONE, Vec3::new(0.0, -1.0, 0.0), 0.5f32.to_radians())
    }
}

impl Light {
    pub fn directional(color: Vec3, direction: Vec3, angular_size: f32) -> Self {
        Self {
            color: color.to_array(),
            ty: LightType::Directional as u32,
            direction_or_location: direction.normalize_or_zero().to_array(),
            size: angular_size,
        }
    }

    pub fn sphere(color: Vec3, location: Vec3, radius: f32) -> Self {
        Self {
            color: color.to_array(),
            ty: LightType::Sphere as u32,
            direction_or_location: location.to_array(),
            size: radius,
        }
    }
}

/// forward pass 使用的材质
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StandardMaterial {
    pub albedo: TextureHandle,
    pub normal_roughness: TextureHandle,
    pub specular_color_emission: TextureHandle,
    pub noise: TextureHandle,
}

/// 累积 pass 使用的材质
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AccumulationMaterial {
    pub accumulation_texture: TextureHandle,
    pub scene_output_texture: TextureHandle,
    pub scene_depth_texture: TextureHandle,
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec4};

    #[test]
    fn test_gpu_layout_sizes() {
        assert_eq!(size_of::<PerFrameData>(), 16);
        assert_eq!(size_of::<CameraMatrices>(), 6 * 64);
        assert_eq!(size_of::<Light>(), 32);
        assert_eq!(size_of::<StandardMaterial>(), 16);
        assert_eq!(size_of::<AccumulationMaterial>(), 12);
    }

    #[test]
    fn test_view_matrix_moves_camera_to_origin() {
        let transform = TransformComponent {
            location: Vec3::new(0.0, 1.0, 5.0),
            rotation: Quat::from_rotation_y(0.3),
            scale: Vec3::splat(4.0),
        };
        let mut matrices = CameraMatrices::default();
        matrices.calculate_view_matrix(&transform);

        let eye = matrices.view.transform_point3(transform.location);
        assert!(eye.length() < 1e-5);

        // 相机前方的点在 view space 中位于 -z
        let ahead = matrices.view.transform_point3(transform.location + transform.forward() * 2.0);
        assert!((ahead - Vec3::new(0.0, 0.0, -2.0)).length() < 1e-4);

        let identity = matrices.view * matrices.inverse_view;
        assert!(identity.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_projection_is_reversed_z() {
        let camera = CameraComponent::default();
        let mut matrices = CameraMatrices::default();
        matrices.calculate_projection_matrix(&camera);

        let near = matrices.projection * Vec4::new(0.0, 0.0, -camera.near_clip_plane, 1.0);
        assert!((near.z / near.w - 1.0).abs() < 1e-5);

        let far = matrices.projection * Vec4::new(0.0, 0.0, -1.0e6, 1.0);
        assert!(far.z / far.w < 1e-6);

        // 90 度的竖直视角：位于 y = -z 的点投影到 NDC 的上边缘
        let top = matrices.projection * Vec4::new(0.0, 1.0, -1.0, 1.0);
        assert!((top.y / top.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_previous_matrices() {
        let mut matrices = CameraMatrices::default();
        matrices.calculate_projection_matrix(&CameraComponent::default());
        matrices.copy_matrices_to_previous();
        assert_eq!(matrices.previous_projection, matrices.projection);
    }
}
