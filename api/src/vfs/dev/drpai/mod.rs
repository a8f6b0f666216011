//! DRP-AI Driver for RZ/V2L (Renesas)
//!
//! DRP-AI 由两个引擎组成：动态可重构处理器 (DRP) 与 AI-MAC 乘加协处理器。
//! 本模块实现其控制核心：
//!
//! - 全局硬件会话 (`hw_token` 串行化 open/close/start/reset/get_status)
//! - 每个句柄的读写状态机 (见 [`crate::file::drpai`])
//! - 物理区域校验与已分配区域登记
//! - 四路中断 (DRP 正常/错误、AI-MAC 正常/错误) 与一次性完成回调
//! - 参数描述文本的搜索与修补
//!
//! 寄存器级操作由 [`DrpaiHal`] 提供，缓存、时钟、DMA 内存由 [`DrpaiPlatform`] 提供。

pub mod device;
pub mod error;
pub mod hal;
pub mod irq;
pub mod kernel;
pub mod param;
pub mod platform;
pub mod region;
pub mod session;
pub mod transfer;
pub mod types;

pub use device::DrpaiDevice;
pub use error::{DrpaiError, DrpaiResult};
pub use hal::{DrpaiHal, OdifIntCount};
pub use irq::DrpaiIrq;
pub use kernel::CompletionToken;
pub use platform::{DmaRegion, DrpaiPlatform};
pub use region::{PhysSpan, RegionRegistry};
pub use session::{DrpaiSession, lock_timeout};
pub use transfer::{RwPhase, TransferState};
pub use types::*;

/// 驱动版本
pub const DRPAI_DRIVER_VERSION: &str = "1.10";

/// 设备名
pub const DRPAI_DRIVER_NAME: &str = "drpai";

/// 通道号 (当前硬件只有一个通道)
pub const DRPAI_CHANNEL: u32 = 0;

/// 物理地址对齐要求 (64 字节)
pub const DRPAI_ALIGN: u64 = 0x40;

/// hw_token 默认等待超时 (毫秒)
pub const DEFAULT_TOKEN_TIMEOUT_MS: u64 = 1000;

/// 复位控制器状态轮询次数上限
pub const RST_MAX_TIMEOUT: u32 = 100;

/// 描述符尾部链接字节相对末尾的偏移
pub const DESC_LINK_OFFSET_FROM_END: u32 = 13;

/// 写入描述符尾部的链接字节
pub const DESC_LINK_BYTE: u8 = 0x08;

/// 单个 DRP 描述符大小
pub const DRPAI_SGL_DRP_DESC_SIZE: usize = 80;

/// 描述符命令大小
pub const DRPAI_DESC_CMD_SIZE: usize = 16;

/// 特权调用者使用的 DMA 描述符链缓冲大小 (含对齐余量)
pub const DRPAI_CMA_SIZE: usize = DRPAI_SGL_DRP_DESC_SIZE + DRPAI_DESC_CMD_SIZE + 64;

/// 参数描述文本的最大行长
pub const DRP_PARAM_MAX_LINE_LENGTH: usize = 512;
