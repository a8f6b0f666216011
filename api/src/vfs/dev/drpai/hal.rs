//! DRP / AI-MAC 寄存器级操作接口
//!
//! 寄存器编程细节不在本驱动范围内，由板级代码实现此 trait 并在 probe 时注入。

use super::{error::DrpaiResult, types::DrpaiStatusInfo};

/// DRP 输出数据接口 (ODIF) 四路完成计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OdifIntCount {
    pub ch0: u32,
    pub ch1: u32,
    pub ch2: u32,
    pub ch3: u32,
}

impl OdifIntCount {
    pub const fn new(ch0: u32, ch1: u32, ch2: u32, ch3: u32) -> Self {
        Self { ch0, ch1, ch2, ch3 }
    }

    /// 累加另一组计数
    pub fn accumulate(&mut self, other: &OdifIntCount) {
        self.ch0 = self.ch0.wrapping_add(other.ch0);
        self.ch1 = self.ch1.wrapping_add(other.ch1);
        self.ch2 = self.ch2.wrapping_add(other.ch2);
        self.ch3 = self.ch3.wrapping_add(other.ch3);
    }

    /// 四路都至少完成一次
    pub fn all_done(&self) -> bool {
        self.ch0 >= 1 && self.ch1 >= 1 && self.ch2 >= 1 && self.ch3 >= 1
    }
}

/// DRP-AI 硬件抽象层
///
/// 所有方法都可能在中断上下文中调用 (`*_nmlint` / `*_errint`)，实现不得睡眠。
pub trait DrpaiHal: Send + Sync {
    /// 打开 DRP 通道
    fn drp_open(&self, ch: u32);
    /// 打开 AI-MAC 通道
    fn aimac_open(&self, ch: u32);

    /// 复位 DRP
    fn drp_reset(&self, ch: u32) -> DrpaiResult<()>;
    /// 复位 AI-MAC
    fn aimac_reset(&self, ch: u32) -> DrpaiResult<()>;
    /// 复位 CPG 寄存器
    fn cpg_reset(&self) -> DrpaiResult<()>;

    /// 以描述符物理地址启动 DRP
    fn drp_start(&self, ch: u32, desc_addr: u32);
    /// 以描述符物理地址启动 AI-MAC
    fn aimac_start(&self, ch: u32, desc_addr: u32);

    /// DRP 正常中断处理，返回本次中断读到的 ODIF 计数
    fn drp_nmlint(&self, ch: u32) -> OdifIntCount;
    /// DRP 错误中断处理
    fn drp_errint(&self, ch: u32);
    /// AI-MAC 正常中断处理
    fn aimac_nmlint(&self, ch: u32);
    /// AI-MAC 错误中断处理
    fn aimac_errint(&self, ch: u32);

    /// 刷新汇总状态 (`R_DRPAI_Status`)
    fn refresh_status(&self, ch: u32, status: &mut DrpaiStatusInfo);

    /// 读取 DRP 寄存器窗口内的 32 位字
    fn read_drp_reg(&self, offset: u32) -> u32;
    /// 读取 AI-MAC 寄存器窗口内的 32 位字
    fn read_aimac_reg(&self, offset: u32) -> u32;
}
