pub mod pipeline;
pub mod push;
pub mod realtime;
