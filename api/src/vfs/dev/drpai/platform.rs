//! DRP-AI 平台操作
//!
//! 缓存维护、物理内存访问、时钟/复位控制器与 DMA coherent 内存由平台提供，
//! 本文件定义该接口以及建立在其上的辅助流程 (CPG 初始化、参数字段修补、
//! 输入区域裁剪刷新)。

use memory_addr::{PhysAddr, PhysAddrRange};

use super::{
    RST_MAX_TIMEOUT,
    error::{DrpaiError, DrpaiResult},
    region::{PhysSpan, phys_span},
    types::{DrpaiData, DrpaiPlatformCfg},
};

/// 复位控制器短延时阶段的轮询间隔 (微秒)
const RST_SHORT_DELAY_US: u32 = 1;
/// 复位控制器长延时阶段的轮询间隔 (微秒)
const RST_LONG_DELAY_US: u32 = 100;

/// DMA coherent 内存块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRegion {
    /// 总线 (物理) 地址
    pub bus_addr: PhysAddr,
    /// 大小
    pub size: usize,
}

impl DmaRegion {
    pub fn span(&self) -> PhysSpan {
        PhysAddrRange::from_start_size(self.bus_addr, self.size)
    }
}

/// 平台操作接口
pub trait DrpaiPlatform: Send + Sync {
    /// 读取物理内存 (地址未映射时返回 `Fault`)
    fn read_phys(&self, addr: PhysAddr, buf: &mut [u8]) -> DrpaiResult<()>;

    /// 写入物理内存 (地址未映射时返回 `Fault`)
    fn write_phys(&self, addr: PhysAddr, data: &[u8]) -> DrpaiResult<()>;

    /// 将 CPU 缓存写回内存 (CPU W -> DRP-AI R)
    fn flush_dcache(&self, span: PhysSpan) -> DrpaiResult<()>;

    /// 使 CPU 缓存失效 (DRP-AI W -> CPU R)
    fn invalidate_dcache(&self, span: PhysSpan) -> DrpaiResult<()>;

    /// 打开 DRP-AI 所有时钟
    fn clock_enable(&self);

    /// 关闭 DRP-AI 所有时钟
    fn clock_disable(&self);

    /// 触发复位控制器
    fn reset_control_reset(&self);

    /// 复位控制器是否已完成
    fn reset_control_status(&self) -> bool;

    /// 分配 DMA coherent 内存
    fn alloc_coherent(&self, size: usize) -> DrpaiResult<DmaRegion>;

    /// 释放 DMA coherent 内存
    fn dealloc_coherent(&self, region: DmaRegion);

    /// 当前时间 (微秒)
    fn now_us(&self) -> u64;

    /// 忙等指定微秒
    fn udelay(&self, us: u32);

    /// 自旋等待中让出 CPU
    fn relax(&self) {
        core::hint::spin_loop();
    }

    /// 检查是否超时
    fn timeout_check(&self, start_us: u64, timeout_us: u64) -> bool {
        let elapsed = self.now_us().saturating_sub(start_us);
        elapsed >= timeout_us
    }
}

/// 打开时钟并等待复位控制器完成
///
/// 先以 1us 间隔轮询，再以 100us 间隔轮询，各最多 `RST_MAX_TIMEOUT` 次。
/// 失败时时钟保持打开，由调用者关闭。
pub fn cpg_init(platform: &dyn DrpaiPlatform) -> DrpaiResult<()> {
    platform.clock_enable();

    debug!(
        "[DRPAI] reset_control_status before: {}",
        platform.reset_control_status()
    );
    platform.reset_control_reset();

    for delay in [RST_SHORT_DELAY_US, RST_LONG_DELAY_US] {
        for _ in 0..RST_MAX_TIMEOUT {
            platform.udelay(delay);
            if platform.reset_control_status() {
                return Ok(());
            }
        }
    }

    error!("[DRPAI] CPG reset failed");
    Err(DrpaiError::IoFault)
}

/// 计算输入区域与 Linux 内存窗口的交集
///
/// - 完全在窗口内：整个区域
/// - 起点在窗口内、终点超出：起点到窗口末尾
/// - 终点在窗口内、起点在窗口前：窗口起点到区域末尾
/// - 其他情况：不刷新
pub fn input_flush_span(input: &DrpaiData, cfg: &DrpaiPlatformCfg) -> Option<(u64, u64)> {
    if input.size == 0 || cfg.linux_mem_size == 0 {
        return None;
    }
    let in_start = input.address as u64;
    let in_last = in_start + input.size as u64 - 1;
    let win_start = cfg.linux_mem_start as u64;
    let win_end = win_start + cfg.linux_mem_size as u64;
    let win_last = win_end - 1;

    if in_start >= win_start && in_last <= win_last {
        Some((in_start, input.size as u64))
    } else if in_start >= win_start && in_start <= win_last && in_last > win_last {
        Some((in_start, win_end - in_start))
    } else if in_last >= win_start && in_last <= win_last && in_start < win_start {
        Some((win_start, in_last + 1 - win_start))
    } else {
        None
    }
}

/// 刷新输入区域中属于 Linux 内存窗口的部分
pub fn flush_input_area(
    platform: &dyn DrpaiPlatform,
    input: &DrpaiData,
    cfg: &DrpaiPlatformCfg,
) -> DrpaiResult<()> {
    if let Some((start, size)) = input_flush_span(input, cfg) {
        #[cfg(feature = "dev-log")]
        trace!("[DRPAI] flush input 0x{:x} size 0x{:x}", start, size);
        platform.flush_dcache(PhysAddrRange::from_start_size(
            PhysAddr::from(start as usize),
            size as usize,
        ))?;
    }
    Ok(())
}

/// 修补参数对象中的 16 位字段并刷新
pub fn param_change16(
    platform: &dyn DrpaiPlatform,
    base: u32,
    offset: u32,
    value: u16,
) -> DrpaiResult<()> {
    write_and_flush(platform, base, offset, &value.to_le_bytes())
}

/// 修补参数对象中的 32 位字段并刷新
pub fn param_change32(
    platform: &dyn DrpaiPlatform,
    base: u32,
    offset: u32,
    value: u32,
) -> DrpaiResult<()> {
    write_and_flush(platform, base, offset, &value.to_le_bytes())
}

fn write_and_flush(
    platform: &dyn DrpaiPlatform,
    base: u32,
    offset: u32,
    bytes: &[u8],
) -> DrpaiResult<()> {
    let addr = base.checked_add(offset).ok_or(DrpaiError::Fault)?;
    let span = phys_span(addr, bytes.len() as u32).map_err(|_| DrpaiError::Fault)?;
    platform.write_phys(span.start, bytes)?;
    platform.flush_dcache(span)
}
