//! DRP-AI 驱动数据结构定义
//!
//! ioctl 交换的结构体布局与 C 侧 `drpai.h` 保持一致 (`#[repr(C)]`)。

use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::error::{DrpaiError, DrpaiResult};

// ============================================================================
// ioctl 命令
// ============================================================================

/// IOCTL 宏定义
macro_rules! ioctl_io {
    ($magic:expr, $nr:expr) => {
        (($magic as u32) << 8) | ($nr as u32)
    };
}

macro_rules! ioctl_iow {
    ($magic:expr, $nr:expr, $ty:ty) => {
        (1u32 << 30) | (($magic as u32) << 8) | ($nr as u32) | ((core::mem::size_of::<$ty>() as u32) << 16)
    };
}

macro_rules! ioctl_ior {
    ($magic:expr, $nr:expr, $ty:ty) => {
        (2u32 << 30) | (($magic as u32) << 8) | ($nr as u32) | ((core::mem::size_of::<$ty>() as u32) << 16)
    };
}

/// DRP-AI ioctl 类型号
pub const DRPAI_IO_TYPE: u32 = 46;

pub const DRPAI_ASSIGN: u32 = ioctl_iow!(DRPAI_IO_TYPE, 0, DrpaiData);
pub const DRPAI_START: u32 = ioctl_iow!(DRPAI_IO_TYPE, 1, DrpaiData);
pub const DRPAI_RESET: u32 = ioctl_io!(DRPAI_IO_TYPE, 2);
pub const DRPAI_GET_STATUS: u32 = ioctl_ior!(DRPAI_IO_TYPE, 3, DrpaiStatusInfo);
pub const DRPAI_REG_DUMP: u32 = ioctl_io!(DRPAI_IO_TYPE, 5);
pub const DRPAI_ASSIGN_PARAM: u32 = ioctl_iow!(DRPAI_IO_TYPE, 6, DrpaiAssignParam);
pub const DRPAI_PREPOST_CROP: u32 = ioctl_iow!(DRPAI_IO_TYPE, 7, DrpaiCrop);
pub const DRPAI_PREPOST_INADDR: u32 = ioctl_iow!(DRPAI_IO_TYPE, 8, DrpaiInout);

// ============================================================================
// 描述符索引
// ============================================================================

pub const DRPAI_INDEX_NUM: usize = 7;
pub const DRPAI_INDEX_INPUT: usize = 0;
pub const DRPAI_INDEX_DRP_DESC: usize = 1;
pub const DRPAI_INDEX_DRP_CFG: usize = 2;
pub const DRPAI_INDEX_DRP_PARAM: usize = 3;
pub const DRPAI_INDEX_AIMAC_DESC: usize = 4;
pub const DRPAI_INDEX_WEIGHT: usize = 5;
pub const DRPAI_INDEX_OUTPUT: usize = 6;

pub const DRPAI_RESERVED_NUM: usize = 10;
pub const DRPAI_MAX_NODE_NAME: usize = 256;

// ============================================================================
// 状态码
// ============================================================================

/// 设备全局状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum DrpaiStatusCode {
    Init = 0,
    Idle = 1,
    Run = 2,
}

/// 粘滞错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum DrpaiErrInfo {
    Success = 0,
    DrpErr = -1,
    AimacErr = -2,
    Reset = -3,
}

// ============================================================================
// ABI 结构体
// ============================================================================

/// 物理地址 / 长度对
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrpaiData {
    pub address: u32,
    pub size: u32,
}

impl DrpaiData {
    pub const fn new(address: u32, size: u32) -> Self {
        Self { address, size }
    }
}

/// DRPAI_GET_STATUS 返回值 (`drpai_status_t`)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrpaiStatusInfo {
    pub status: u32,
    pub err: i32,
    pub reserved: [u32; DRPAI_RESERVED_NUM],
}

impl DrpaiStatusInfo {
    /// 刚 probe 完成时的状态
    pub const fn initial() -> Self {
        Self {
            status: DrpaiStatusCode::Init as u32,
            err: DrpaiErrInfo::Success as i32,
            reserved: [0; DRPAI_RESERVED_NUM],
        }
    }

    pub fn status_code(&self) -> Option<DrpaiStatusCode> {
        DrpaiStatusCode::try_from(self.status).ok()
    }

    pub fn err_info(&self) -> Option<DrpaiErrInfo> {
        DrpaiErrInfo::try_from(self.err).ok()
    }

    pub fn is_running(&self) -> bool {
        self.status == DrpaiStatusCode::Run as u32
    }

    /// 把状态快照转换为 get_status 的返回值：运行中为 `Busy`，有硬件错误为 `IoFault`
    pub fn check(&self) -> DrpaiResult<()> {
        if self.is_running() {
            return Err(DrpaiError::Busy);
        }
        match self.err_info() {
            Some(DrpaiErrInfo::DrpErr | DrpaiErrInfo::AimacErr) => Err(DrpaiError::IoFault),
            _ => Ok(()),
        }
    }
}

/// DRPAI_ASSIGN_PARAM 参数
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrpaiAssignParam {
    pub info_size: u32,
    pub obj: DrpaiData,
}

/// DRPAI_PREPOST_CROP 参数
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrpaiCrop {
    pub img_owidth: u16,
    pub img_oheight: u16,
    pub pos_x: u16,
    pub pos_y: u16,
    pub obj: DrpaiData,
}

/// DRPAI_PREPOST_INADDR 参数
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DrpaiInout {
    /// 以 NUL 结尾的节点名
    pub name: [u8; DRPAI_MAX_NODE_NAME],
    pub data: DrpaiData,
    pub obj: DrpaiData,
}

impl DrpaiInout {
    pub fn new(name: &str, data: DrpaiData, obj: DrpaiData) -> Self {
        let mut buf = [0u8; DRPAI_MAX_NODE_NAME];
        let len = name.len().min(DRPAI_MAX_NODE_NAME - 1);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            name: buf,
            data,
            obj,
        }
    }

    /// 节点名 (到第一个 NUL 为止)
    pub fn node_name(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(DRPAI_MAX_NODE_NAME);
        &self.name[..end]
    }
}

// ============================================================================
// 平台配置
// ============================================================================

/// probe 时提供的平台配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrpaiPlatformCfg {
    /// DRP-AI 专用保留内存起始物理地址
    pub region_base: u32,
    /// DRP-AI 专用保留内存大小
    pub region_size: u32,
    /// Linux 可见内存窗口起始物理地址
    pub linux_mem_start: u32,
    /// Linux 可见内存窗口大小
    pub linux_mem_size: u32,
    /// DRP 寄存器窗口大小 (字节)
    pub drp_reg_size: u32,
    /// AI-MAC 寄存器窗口大小 (字节)
    pub aimac_reg_size: u32,
    /// hw_token 等待超时 (毫秒)
    pub token_timeout_ms: u64,
}

impl Default for DrpaiPlatformCfg {
    fn default() -> Self {
        Self {
            region_base: 0x8000_0000,
            region_size: 0x2000_0000,
            linux_mem_start: 0x4000_0000,
            linux_mem_size: 0x4000_0000,
            drp_reg_size: 0x0100_0000,
            aimac_reg_size: 0x0010_0000,
            token_timeout_ms: super::DEFAULT_TOKEN_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// 描述符模板与参数偏移
// ============================================================================

/// 特权启动路径使用的单 DRP 描述符 + AI-MAC 命令模板
pub const DRP_SINGLE_DESC_BIN: [u8; 96] = [
    0x00, 0x00, 0x00, 0x11, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x80, 0x00, 0x01, 0x00, 0x91, 0x81, 0x50, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x07, 0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x80, 0x00, 0x01, 0x00, 0x91, 0x81, 0x20, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// 模板中 DRP 配置地址 / 大小的位置
pub const DESC_CFG_ADDR_OFFSET: usize = 4;
pub const DESC_CFG_SIZE_OFFSET: usize = 8;
/// 模板中 DRP 参数地址 / 大小的位置
pub const DESC_PARAM_ADDR_OFFSET: usize = 36;
pub const DESC_PARAM_SIZE_OFFSET: usize = 40;

/// drp_param.bin 内各字段偏移
pub const DRP_PARAM_RADDR: u32 = 0;
pub const DRP_PARAM_WADDR: u32 = 4;
pub const DRP_PARAM_IMG_IWIDTH: u32 = 8;
pub const DRP_PARAM_IMG_IHEIGHT: u32 = 10;
pub const DRP_PARAM_IMG_OWIDTH: u32 = 16;
pub const DRP_PARAM_IMG_OHEIGHT: u32 = 18;
pub const DRP_PARAM_CROP_POS_X: u32 = 48;
pub const DRP_PARAM_CROP_POS_Y: u32 = 50;

/// 参数描述文本中的标记
pub const DRP_LIB_NAME_CROP: &[u8] = b",drp_lib:crop,";
pub const DRP_PARAM_ATTR_OFFSET_ADD: &[u8] = b"OFFSET_ADD:";
pub const DRP_PARAM_ATTR_PROP_INPUT: &[u8] = b",prop:input,";
