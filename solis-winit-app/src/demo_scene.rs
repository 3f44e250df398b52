//! 演示场景：起伏地形上的一片立方体，相机绕场景中心旋转

use glam::{Mat4, Quat, Vec3};
use solis_gfx::resources::mesh_data_store::Mesh;
use solis_render_interface::components::{
    CameraComponent, LightComponent, RaytracingObjectComponent, StaticMeshRenderableComponent, TransformComponent,
};
use solis_render_interface::gpu_data::Light;
use solis_render_interface::handles::{LightHandle, StandardMaterialHandle};
use solis_render_interface::registry::{EntityHandle, SceneRegistry};
use solis_render_interface::world::World;
use solis_renderer::renderer::Renderer;

/// 每条边上立方体的数量
const GRID_SIZE: i32 = 5;
const GRID_SPACING: f32 = 2.0;

/// 正弦起伏的地形
pub fn demo_world() -> World {
    World::with_height_function(|x, z| 0.5 * (x * 0.4).sin() * (z * 0.4).cos())
}

/// 以 `(0, 0)` 为中心的网格坐标
pub fn grid_positions(grid_size: i32, spacing: f32) -> Vec<(f32, f32)> {
    let half = (grid_size - 1) as f32 * 0.5;
    (0..grid_size)
        .flat_map(|i| (0..grid_size).map(move |j| ((i as f32 - half) * spacing, (j as f32 - half) * spacing)))
        .collect()
}

/// 朝向 `target` 的旋转，相机的前方为 -Z
pub fn look_at_rotation(eye: Vec3, target: Vec3) -> Quat {
    Quat::from_mat4(&Mat4::look_at_rh(eye, target, Vec3::Y).inverse())
}

/// `height / width`，窗口最小化时保持 1
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if width == 0 || height == 0 { 1.0 } else { height as f32 / width as f32 }
}

/// 绕 y 轴旋转，始终看向原点
#[derive(Clone, Copy, Debug)]
pub struct OrbitCamera {
    pub radius: f32,
    pub height: f32,
    /// 弧度每秒
    pub angular_speed: f32,
    angle: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            radius: 12.0,
            height: 6.0,
            angular_speed: 0.3,
            angle: 0.0,
        }
    }
}

impl OrbitCamera {
    pub fn update(&mut self, delta_seconds: f32) -> TransformComponent {
        self.angle = (self.angle + self.angular_speed * delta_seconds).rem_euclid(std::f32::consts::TAU);
        self.transform()
    }

    pub fn transform(&self) -> TransformComponent {
        let eye = Vec3::new(self.radius * self.angle.cos(), self.height, self.radius * self.angle.sin());
        TransformComponent {
            location: eye,
            rotation: look_at_rotation(eye, Vec3::ZERO),
            scale: Vec3::ONE,
        }
    }
}

pub struct DemoScene {
    camera: EntityHandle,
    cubes: Vec<EntityHandle>,
    orbit: OrbitCamera,
}

// new & init
impl DemoScene {
    pub fn new(renderer: &mut Renderer, registry: &mut SceneRegistry, world: &World, window_size: (u32, u32)) -> Self {
        let _span = tracy_client::span!("DemoScene::new");

        let material = Self::create_material(renderer);
        let cube_mesh = renderer.get_cube_mesh();
        let renderable = StaticMeshRenderableComponent {
            mesh: Renderer::mesh_range(&cube_mesh),
            material,
        };

        let cubes = grid_positions(GRID_SIZE, GRID_SPACING)
            .into_iter()
            .map(|(x, z)| {
                let entity = registry.spawn(TransformComponent {
                    location: Vec3::new(x, world.terrain_height(x, z) + 0.5, z),
                    ..Default::default()
                });
                registry.set_static_mesh(entity, renderable);
                entity
            })
            .collect::<Vec<_>>();

        let sun = registry.spawn(TransformComponent::default());
        registry.set_light(
            sun,
            LightComponent {
                handle: LightHandle::new(0),
                light: Light::directional(Vec3::new(1.0, 0.95, 0.9), Vec3::new(-0.4, -1.0, -0.3), 0.5f32.to_radians()),
            },
        );

        let orbit = OrbitCamera::default();
        let camera = registry.spawn(orbit.transform());
        registry.set_camera(
            camera,
            CameraComponent {
                aspect_ratio: aspect_ratio(window_size.0, window_size.1),
                ..Default::default()
            },
        );

        Self::add_raytracing_objects(renderer, registry, &cubes, cube_mesh, material);

        log::info!("Demo scene created with {} cubes", cubes.len());
        Self { camera, cubes, orbit }
    }

    fn create_material(renderer: &mut Renderer) -> StandardMaterialHandle {
        let material = solis_render_interface::gpu_data::StandardMaterial {
            albedo: renderer.get_noise_texture(),
            ..renderer.default_standard_material()
        };
        renderer.allocate_standard_material(material).unwrap_or_else(|| {
            log::error!("Could not allocate the cube material, using material 0");
            StandardMaterialHandle::default()
        })
    }

    fn add_raytracing_objects(
        renderer: &mut Renderer,
        registry: &mut SceneRegistry,
        cubes: &[EntityHandle],
        cube_mesh: Mesh,
        material: StandardMaterialHandle,
    ) {
        if !renderer.raytracing_enabled() {
            return;
        }

        let mut commands = renderer.get_render_device_mut().create_compute_command_list();
        commands.set_debug_name("Demo scene BLAS build");
        let geometry = renderer.create_raytracing_geometry(&[cube_mesh], &mut commands);
        renderer.get_render_device_mut().submit_command_list(commands);

        let Some(geometry) = geometry else {
            log::warn!("Could not create raytracing geometry for the cube");
            return;
        };
        let object = RaytracingObjectComponent { geometry, material };
        for &cube in cubes {
            registry.set_raytracing_object(cube, object);
        }
        let objects = registry.raytracing_objects().copied().collect::<Vec<_>>();
        renderer.add_raytracing_objects_to_scene(&objects);
    }
}

// getters
impl DemoScene {
    #[inline]
    pub fn num_cubes(&self) -> usize {
        self.cubes.len()
    }
}

// update
impl DemoScene {
    pub fn update(&mut self, registry: &mut SceneRegistry, delta_seconds: f32) {
        let transform = self.orbit.update(delta_seconds);
        if let Some(camera) = registry.get_mut(self.camera) {
            camera.transform = transform;
        }
    }

    pub fn resize(&mut self, registry: &mut SceneRegistry, width: u32, height: u32) {
        if let Some(camera) = registry.get_mut(self.camera).and_then(|e| e.camera.as_mut()) {
            camera.aspect_ratio = aspect_ratio(width, height);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_is_centered() {
        let positions = grid_positions(3, 2.0);
        assert_eq!(positions.len(), 9);
        assert_eq!(positions[0], (-2.0, -2.0));
        assert_eq!(positions[4], (0.0, 0.0));
        assert_eq!(positions[8], (2.0, 2.0));
    }

    #[test]
    fn test_look_at_points_forward_to_target() {
        let eye = Vec3::new(3.0, 4.0, 5.0);
        let rotation = look_at_rotation(eye, Vec3::ZERO);
        let transform = TransformComponent {
            location: eye,
            rotation,
            scale: Vec3::ONE,
        };
        let expected = (-eye).normalize();
        assert!(transform.forward().abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_orbit_keeps_radius_and_height() {
        let mut orbit = OrbitCamera::default();
        for _ in 0..10 {
            let t = orbit.update(0.5);
            let horizontal = Vec3::new(t.location.x, 0.0, t.location.z).length();
            assert!((horizontal - orbit.radius).abs() < 1e-4);
            assert_eq!(t.location.y, orbit.height);
        }
    }

    #[test]
    fn test_aspect_ratio_is_height_over_width() {
        assert_eq!(aspect_ratio(1600, 900), 900.0 / 1600.0);
        assert_eq!(aspect_ratio(0, 900), 1.0);
    }

    #[test]
    fn test_camera_follows_orbit() {
        let mut registry = SceneRegistry::new();
        let camera = registry.spawn(TransformComponent::default());
        registry.set_camera(camera, CameraComponent::default());
        let mut scene = DemoScene {
            camera,
            cubes: Vec::new(),
            orbit: OrbitCamera::default(),
        };

        scene.update(&mut registry, 1.0);
        scene.resize(&mut registry, 800, 400);

        let entity = registry.get(camera).unwrap();
        assert_ne!(entity.transform.location, Vec3::ZERO);
        assert_eq!(entity.camera.unwrap().aspect_ratio, 0.5);
    }
}
