//! # Sources
//!
//! 取数与解码能力的参考实现。
//!
//! - `FileSource`: 本地文件 (`file://` 与绝对路径)
//! - `MemorySource`: 预置内容的内存源，可注入失败与阻塞，用于测试与演示
//! - `ImageDecoder`: 基于 `image` crate 的解码与缩放/裁剪/旋转

mod decoder;
mod file;
mod memory;

pub use decoder::ImageDecoder;
pub use file::FileSource;
pub use memory::{MemorySource, ScriptedFailure};
