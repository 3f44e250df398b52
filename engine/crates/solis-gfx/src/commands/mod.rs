pub mod barrier;
pub mod command_buffer;
pub mod command_list;
pub mod command_pool;
pub mod completion;
pub mod fence;
pub mod frame_sync;
pub mod queue;
pub mod resource_state;
pub mod semaphore;
pub mod submit_info;
