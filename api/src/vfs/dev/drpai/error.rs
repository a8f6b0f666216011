//! DRP-AI 错误类型定义

use core::fmt;

use axerrno::AxError;

/// DRP-AI 操作错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrpaiError {
    /// 等待 hw_token 超时
    Timeout,
    /// 传输锁被占用，调用者应重试
    Retry,
    /// 硬件正在运行
    Busy,
    /// 无效参数 (描述符、长度为零等)
    InvalidArg,
    /// 物理地址未按 64 字节对齐
    Unaligned,
    /// 区域超出保留内存
    OutOfRange,
    /// 与其他已分配区域重叠
    Overlap,
    /// 当前状态不允许该操作
    AccessDenied,
    /// 硬件复位/初始化失败，或存在硬件错误
    IoFault,
    /// 拷贝或解析失败
    Fault,
    /// 内存不足
    NoMemory,
}

impl DrpaiError {
    /// 获取错误码 (兼容 Linux errno 风格)
    pub fn as_errno(&self) -> i32 {
        match self {
            DrpaiError::Timeout => -110,     // ETIMEDOUT
            DrpaiError::Retry => -85,        // ERESTART
            DrpaiError::Busy => -16,         // EBUSY
            DrpaiError::InvalidArg => -22,   // EINVAL
            DrpaiError::Unaligned => -22,
            DrpaiError::OutOfRange => -22,
            DrpaiError::Overlap => -22,
            DrpaiError::AccessDenied => -13, // EACCES
            DrpaiError::IoFault => -5,       // EIO
            DrpaiError::Fault => -14,        // EFAULT
            DrpaiError::NoMemory => -12,     // ENOMEM
        }
    }

    /// 是否可以直接重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DrpaiError::Timeout | DrpaiError::Retry | DrpaiError::Busy
        )
    }
}

impl fmt::Display for DrpaiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "Timed out waiting for hardware token"),
            Self::Retry => write!(f, "Transfer lock contended, retry"),
            Self::Busy => write!(f, "DRP-AI is running"),
            Self::InvalidArg => write!(f, "Invalid argument"),
            Self::Unaligned => write!(f, "Address not aligned"),
            Self::OutOfRange => write!(f, "Address out of reserved region"),
            Self::Overlap => write!(f, "Region overlaps an assigned region"),
            Self::AccessDenied => write!(f, "Operation not allowed in current state"),
            Self::IoFault => write!(f, "Hardware error"),
            Self::Fault => write!(f, "Bad address or malformed data"),
            Self::NoMemory => write!(f, "Out of memory"),
        }
    }
}

impl From<DrpaiError> for AxError {
    fn from(err: DrpaiError) -> Self {
        match err {
            DrpaiError::Timeout => AxError::TimedOut,
            DrpaiError::Retry => AxError::Interrupted,
            DrpaiError::Busy => AxError::ResourceBusy,
            DrpaiError::InvalidArg
            | DrpaiError::Unaligned
            | DrpaiError::OutOfRange
            | DrpaiError::Overlap => AxError::InvalidInput,
            DrpaiError::AccessDenied => AxError::PermissionDenied,
            DrpaiError::IoFault => AxError::Io,
            DrpaiError::Fault => AxError::BadAddress,
            DrpaiError::NoMemory => AxError::NoMemory,
        }
    }
}

pub type DrpaiResult<T> = Result<T, DrpaiError>;
