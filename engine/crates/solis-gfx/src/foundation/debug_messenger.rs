use std::ffi::CStr;

use ash::vk;

/// 可以设置 debug name 的 Vulkan 对象
pub trait DebugType {
    fn debug_type_name() -> &'static str;
    fn vk_handle(&self) -> impl vk::Handle;
}

/// 将 validation layer 的输出转发到 `log`
pub struct GfxDebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl GfxDebugMessenger {
    pub fn new(entry: &ash::Entry, instance: &ash::Instance) -> Self {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let messenger = unsafe {
            loader
                .create_debug_utils_messenger(&Self::create_info(), None)
                .unwrap_or_else(|e| panic!("Could not create the Vulkan debug messenger: {e:?}"))
        };

        Self { loader, messenger }
    }

    /// 同时用于 instance 创建阶段（push_next）和 messenger 本身
    pub fn create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vk_debug_callback))
    }

    pub fn destroy(self) {
        log::info!("destroying debug messenger");
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

/// 某些 layer 会输出 json，其中 `MainMessage` 字段带换行，需要单独输出
fn format_validation_message(message_type: vk::DebugUtilsMessageTypeFlagsEXT, msg: &str) -> String {
    let Ok(serde_json::Value::Object(mut obj)) = serde_json::from_str::<serde_json::Value>(msg) else {
        return format!("[{message_type:?}] {msg}");
    };

    let main_msg = obj.remove("MainMessage").and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
    let rest = serde_json::to_string_pretty(&obj).unwrap_or_default();
    format!("[{message_type:?}]\n{rest}\n{main_msg}")
}

/// # Safety
/// 由 Vulkan loader 调用，`p_callback_data` 在回调期间有效
unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let callback_data = unsafe { *p_callback_data };
    let msg = if callback_data.p_message.is_null() {
        std::borrow::Cow::from("")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let formatted = format_validation_message(message_type, msg.as_ref());
    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("{}", formatted),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("{}", formatted),
        _ => log::info!("{}", formatted),
    }

    // 只有 layer developer 才需要返回 True
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message() {
        let s = format_validation_message(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION, "hello");
        assert!(s.ends_with("hello"));
    }

    #[test]
    fn test_json_main_message_is_last() {
        let s = format_validation_message(
            vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            r#"{"MainMessage": "line1\nline2", "Id": 7}"#,
        );
        assert!(s.ends_with("line1\nline2"));
        assert!(s.contains("\"Id\": 7"));
    }
}
