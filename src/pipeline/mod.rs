pub mod frame_loop;
pub mod pipeline;
