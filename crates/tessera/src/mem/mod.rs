//! Buffers, multi-dimensional views, and data-movement tasks

mod buffer;
mod transfer;
mod view;

pub use buffer::Buffer;
pub use transfer::{create_task_copy, create_task_set, CopyTask, SetTask};
pub use view::{DevPtr, View, ViewMut};

pub(crate) use buffer::Storage;
