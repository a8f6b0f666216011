//! DRP-AI accelerator control core.
//!
//! 设备侧 (`vfs::dev::drpai`) 管理硬件会话、区域登记、中断与参数修补；
//! 文件侧 (`file::drpai`) 是每个打开句柄的读写状态机。

#![cfg_attr(not(test), no_std)]

extern crate alloc;
#[macro_use]
extern crate log;

pub mod file;
pub mod vfs;

pub use file::drpai::DrpaiFile;
pub use vfs::dev::drpai::{DrpaiDevice, DrpaiError, DrpaiResult};
