/// 地形高度的查询函数：(x, z) -> y
pub type HeightFunction = Box<dyn Fn(f32, f32) -> f32 + Send + Sync>;

/// 渲染 pass 可以读取的世界信息，地形本身由外部生成
#[derive(Default)]
pub struct World {
    height_function: Option<HeightFunction>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_height_function(height_function: impl Fn(f32, f32) -> f32 + Send + Sync + 'static) -> Self {
        Self {
            height_function: Some(Box::new(height_function)),
        }
    }

    /// 没有地形时高度为 0
    #[inline]
    pub fn terrain_height(&self, x: f32, z: f32) -> f32 {
        self.height_function.as_ref().map_or(0.0, |f| f(x, z))
    }

    #[inline]
    pub fn has_terrain(&self) -> bool {
        self.height_function.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terrain_height() {
        assert_eq!(World::new().terrain_height(3.0, 4.0), 0.0);

        let world = World::with_height_function(|x, z| x + 2.0 * z);
        assert!(world.has_terrain());
        assert_eq!(world.terrain_height(1.0, 2.0), 5.0);
    }
}
