/// debug label 使用的颜色
pub struct LabelColor;
impl LabelColor {
    /// render pass 以及 compute pass
    pub const COLOR_PASS: glam::Vec4 = glam::vec4(0.0, 0.0, 1.0, 1.0);
    /// 整个 command list
    pub const COLOR_CMD: glam::Vec4 = glam::vec4(0.0, 1.0, 0.0, 1.0);
    /// 图形调试工具的捕获范围
    pub const COLOR_CAPTURE: glam::Vec4 = glam::vec4(1.0, 0.0, 0.0, 1.0);
}
