//! 渲染器对外暴露的轻量 handle
//!
//! 除了 [`MaterialHandle`]，所有 handle 都是 u32 的 newtype，可以直接写入 GPU buffer

use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

macro_rules! index_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(
            Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
            bytemuck::Pod, bytemuck::Zeroable, serde::Serialize, serde::Deserialize,
        )]
        pub struct $name {
            pub index: u32,
        }

        impl $name {
            #[inline]
            pub const fn new(index: u32) -> Self {
                Self { index }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.index)
            }
        }
    };
}

index_handle!(
    /// 在纹理数组中的位置，shader 通过 `textures[index]` 访问
    TextureHandle
);
index_handle!(
    /// 在 material buffer 中的索引，以 `StandardMaterial` 为单位
    StandardMaterialHandle
);
index_handle!(
    /// 在 BLAS 列表中的位置
    RaytracableGeometryHandle
);
index_handle!(
    /// 在 light buffer 中的位置
    LightHandle
);

/// material arena 中某个 `T` 的位置，以字节为单位
pub struct MaterialHandle<T> {
    offset: u32,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> MaterialHandle<T> {
    #[inline]
    pub(crate) const fn from_offset(offset: u32) -> Self {
        Self {
            offset,
            _phantom: PhantomData,
        }
    }

    /// 将 shader 使用的索引转换回 handle
    #[inline]
    pub const fn from_index(index: u32) -> Self {
        Self::from_offset(index * size_of::<T>() as u32)
    }

    #[inline]
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// 把 material buffer 看作 `T` 的数组时的索引
    #[inline]
    pub const fn index(&self) -> u32 {
        self.offset / size_of::<T>() as u32
    }
}

impl<T> Clone for MaterialHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for MaterialHandle<T> {}
impl<T> PartialEq for MaterialHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
    }
}
impl<T> Eq for MaterialHandle<T> {}
impl<T> Debug for MaterialHandle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MaterialHandle<{}>({})", std::any::type_name::<T>(), self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_plain_u32() {
        assert_eq!(size_of::<TextureHandle>(), 4);
        assert_eq!(bytemuck::bytes_of(&TextureHandle::new(7)), &7u32.to_ne_bytes());
        assert_eq!(TextureHandle::new(3).to_string(), "TextureHandle(3)");
    }

    #[test]
    fn test_material_handle_index_from_offset() {
        let handle = MaterialHandle::<[u32; 4]>::from_index(5);
        assert_eq!(handle.offset(), 80);
        assert_eq!(handle.index(), 5);
        assert_eq!(handle, MaterialHandle::from_offset(80));
    }
}
