pub mod acceleration;
pub mod raytracing_structs;
