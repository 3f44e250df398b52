pub mod bind_group;
pub mod descriptor_allocator;
pub mod descriptor_heap;
pub mod sampler;
