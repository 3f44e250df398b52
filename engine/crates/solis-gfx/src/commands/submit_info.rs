use ash::vk;
use itertools::Itertools;

/// 对 `vk::SubmitInfo2` 的封装，自己持有所有数组，更易用
#[derive(Default)]
pub struct GfxSubmitInfo {
    command_buffers: Vec<vk::CommandBufferSubmitInfo<'static>>,
    wait_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
    signal_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
}

impl GfxSubmitInfo {
    pub fn new(command_buffers: &[vk::CommandBuffer]) -> Self {
        Self {
            command_buffers: command_buffers
                .iter()
                .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(*cmd))
                .collect_vec(),
            wait_infos: vec![],
            signal_infos: vec![],
        }
    }

    #[inline]
    pub fn submit_info(&self) -> vk::SubmitInfo2<'_> {
        vk::SubmitInfo2::default()
            .command_buffer_infos(&self.command_buffers)
            .wait_semaphore_infos(&self.wait_infos)
            .signal_semaphore_infos(&self.signal_infos)
    }

    /// 二值 semaphore 的 value 使用 None
    #[inline]
    pub fn wait(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2, value: Option<u64>) -> Self {
        self.wait_infos.push(
            vk::SemaphoreSubmitInfo::default()
                .semaphore(semaphore)
                .stage_mask(stage)
                .value(value.unwrap_or_default()),
        );
        self
    }

    #[inline]
    pub fn signal(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2, value: Option<u64>) -> Self {
        self.signal_infos.push(
            vk::SemaphoreSubmitInfo::default()
                .semaphore(semaphore)
                .stage_mask(stage)
                .value(value.unwrap_or_default()),
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_submit_info_counts() {
        let info = GfxSubmitInfo::new(&[vk::CommandBuffer::from_raw(1), vk::CommandBuffer::from_raw(2)])
            .wait(vk::Semaphore::from_raw(3), vk::PipelineStageFlags2::ALL_COMMANDS, None)
            .signal(vk::Semaphore::from_raw(4), vk::PipelineStageFlags2::ALL_COMMANDS, Some(7));

        let submit = info.submit_info();
        assert_eq!(submit.command_buffer_info_count, 2);
        assert_eq!(submit.wait_semaphore_info_count, 1);
        assert_eq!(submit.signal_semaphore_info_count, 1);
        assert_eq!(info.signal_infos[0].value, 7);
    }
}
