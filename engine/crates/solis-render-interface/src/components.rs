//! 渲染器从实体注册表中读取的组件

use glam::{Mat4, Quat, Vec3};

use crate::gpu_data::Light;
use crate::handles::{LightHandle, RaytracableGeometryHandle, StandardMaterialHandle};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformComponent {
    pub location: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self {
            location: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl TransformComponent {
    /// 先缩放，再旋转，最后平移
    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.location)
    }

    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

/// 相机参数
///
/// `fov` 是竖直方向的视角，单位为角度；`aspect_ratio` 是高除以宽
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraComponent {
    /// 在 camera buffer 中的位置
    pub idx: u32,

    pub fov: f32,
    pub aspect_ratio: f32,
    pub near_clip_plane: f32,
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self {
            idx: 0,
            fov: 90.0,
            aspect_ratio: 9.0 / 16.0,
            near_clip_plane: 0.01,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LightComponent {
    pub handle: LightHandle,
    pub light: Light,
}

/// mesh 在共享 index buffer 中的范围
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeshRange {
    pub first_index: u32,
    pub num_indices: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StaticMeshRenderableComponent {
    pub mesh: MeshRange,
    pub material: StandardMaterialHandle,
}

/// 光追场景中的一个实例
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RaytracingObjectComponent {
    pub geometry: RaytracableGeometryHandle,
    pub material: StandardMaterialHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_matrix_order() {
        let transform = TransformComponent {
            location: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            scale: Vec3::splat(2.0),
        };
        // (1, 0, 0) 缩放为 (2, 0, 0)，绕 y 轴旋转 90 度变为 (0, 0, -2)，再平移
        let p = transform.to_matrix().transform_point3(Vec3::X);
        assert!((p - Vec3::new(1.0, 2.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_camera_defaults() {
        let camera = CameraComponent::default();
        assert_eq!(camera.fov, 90.0);
        assert_eq!(camera.aspect_ratio, 9.0 / 16.0);
        assert_eq!(camera.near_clip_plane, 0.01);
    }
}
