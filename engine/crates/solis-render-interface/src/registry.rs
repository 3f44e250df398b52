//! 渲染器读取场景的接口
//!
//! 实体系统本身不属于渲染器，这里只定义渲染需要的查询，以及一个基于 SlotMap 的简单实现

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

use slotmap::SlotMap;

use crate::components::{
    CameraComponent, LightComponent, RaytracingObjectComponent, StaticMeshRenderableComponent, TransformComponent,
};

/// 渲染器每一帧从场景中读取的数据
pub trait RenderRegistry {
    fn cameras(&self) -> Box<dyn Iterator<Item = (&TransformComponent, &CameraComponent)> + '_>;

    fn lights(&self) -> Box<dyn Iterator<Item = &LightComponent> + '_>;

    fn static_meshes(&self) -> Box<dyn Iterator<Item = (&TransformComponent, &StaticMeshRenderableComponent)> + '_>;
}

slotmap::new_key_type! {
    pub struct EntityHandle;
}

#[derive(Default)]
pub struct SceneEntity {
    pub transform: TransformComponent,
    pub camera: Option<CameraComponent>,
    pub light: Option<LightComponent>,
    pub static_mesh: Option<StaticMeshRenderableComponent>,
    pub raytracing_object: Option<RaytracingObjectComponent>,
}

/// 每个实体固定拥有 transform，其余组件可选
#[derive(Default)]
pub struct SceneRegistry {
    entities: SlotMap<EntityHandle, SceneEntity>,
}

// new & init
impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

// tools
impl SceneRegistry {
    pub fn spawn(&mut self, transform: TransformComponent) -> EntityHandle {
        self.entities.insert(SceneEntity {
            transform,
            ..Default::default()
        })
    }

    pub fn despawn(&mut self, entity: EntityHandle) -> Option<SceneEntity> {
        self.entities.remove(entity)
    }

    #[inline]
    pub fn get(&self, entity: EntityHandle) -> Option<&SceneEntity> {
        self.entities.get(entity)
    }

    #[inline]
    pub fn get_mut(&mut self, entity: EntityHandle) -> Option<&mut SceneEntity> {
        self.entities.get_mut(entity)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// 实体不存在时返回 false
    pub fn set_camera(&mut self, entity: EntityHandle, camera: CameraComponent) -> bool {
        self.entities.get_mut(entity).map(|e| e.camera = Some(camera)).is_some()
    }

    pub fn set_light(&mut self, entity: EntityHandle, light: LightComponent) -> bool {
        self.entities.get_mut(entity).map(|e| e.light = Some(light)).is_some()
    }

    pub fn set_static_mesh(&mut self, entity: EntityHandle, mesh: StaticMeshRenderableComponent) -> bool {
        self.entities.get_mut(entity).map(|e| e.static_mesh = Some(mesh)).is_some()
    }

    pub fn set_raytracing_object(&mut self, entity: EntityHandle, object: RaytracingObjectComponent) -> bool {
        self.entities.get_mut(entity).map(|e| e.raytracing_object = Some(object)).is_some()
    }

    pub fn raytracing_objects(&self) -> impl Iterator<Item = &RaytracingObjectComponent> {
        self.entities.values().filter_map(|e| e.raytracing_object.as_ref())
    }
}

impl RenderRegistry for SceneRegistry {
    fn cameras(&self) -> Box<dyn Iterator<Item = (&TransformComponent, &CameraComponent)> + '_> {
        Box::new(self.entities.values().filter_map(|e| e.camera.as_ref().map(|c| (&e.transform, c))))
    }

    fn lights(&self) -> Box<dyn Iterator<Item = &LightComponent> + '_> {
        Box::new(self.entities.values().filter_map(|e| e.light.as_ref()))
    }

    fn static_meshes(&self) -> Box<dyn Iterator<Item = (&TransformComponent, &StaticMeshRenderableComponent)> + '_> {
        Box::new(self.entities.values().filter_map(|e| e.static_mesh.as_ref().map(|m| (&e.transform, m))))
    }
}

/// 在多个线程之间共享的资源，只能通过作用域内的 accessor 访问
pub struct SynchronizedResource<T> {
    inner: Mutex<T>,
}

/// 持有锁的访问器，离开作用域时释放锁
pub struct SynchronizedResourceAccessor<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> SynchronizedResource<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// 持有锁的线程 panic 之后，数据仍然可以继续访问
    pub fn lock(&self) -> SynchronizedResourceAccessor<'_, T> {
        let _span = tracy_client::span!("SynchronizedResource::lock");
        let guard = self.inner.lock().unwrap_or_else(|poisoned| {
            log::warn!("Synchronized resource was poisoned by a panicking thread, continuing anyway");
            poisoned.into_inner()
        });
        SynchronizedResourceAccessor { guard }
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> Deref for SynchronizedResourceAccessor<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SynchronizedResourceAccessor<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::MeshRange;
    use crate::handles::StandardMaterialHandle;
    use std::sync::Arc;

    #[test]
    fn test_queries_filter_by_component() {
        let mut registry = SceneRegistry::new();
        let camera = registry.spawn(TransformComponent::default());
        registry.set_camera(camera, CameraComponent::default());

        let cube = registry.spawn(TransformComponent::default());
        registry.set_static_mesh(cube, StaticMeshRenderableComponent {
            mesh: MeshRange {
                first_index: 6,
                num_indices: 36,
            },
            material: StandardMaterialHandle::new(2),
        });
        registry.spawn(TransformComponent::default());

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.cameras().count(), 1);
        assert_eq!(registry.lights().count(), 0);
        let meshes = registry.static_meshes().collect::<Vec<_>>();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].1.mesh.num_indices, 36);

        registry.despawn(cube);
        assert_eq!(registry.static_meshes().count(), 0);
        assert!(!registry.set_light(cube, LightComponent::default()));
    }

    #[test]
    fn test_synchronized_resource_scoped_lock() {
        let shared = Arc::new(SynchronizedResource::new(SceneRegistry::new()));

        let handles = (0..4)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        shared.lock().spawn(TransformComponent::default());
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.lock().len(), 40);
    }
}
