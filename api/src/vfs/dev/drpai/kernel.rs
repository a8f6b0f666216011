//! 内核内调用者 (ISP 库) 使用的特权接口
//!
//! 与用户态路径共享 hw_token 与引用计数，但不需要调用者准备描述符文件：
//! 打开时分配一块 DMA coherent 缓冲并写入固定的单 DRP 描述符模板，
//! 启动时只需提供 DRP 配置与参数两个区域。

use alloc::boxed::Box;
use core::fmt;

use memory_addr::{PhysAddr, align_up};

use super::{
    DRPAI_ALIGN, DRPAI_CMA_SIZE, DRPAI_SGL_DRP_DESC_SIZE,
    device::DrpaiDevice,
    error::{DrpaiError, DrpaiResult},
    platform::{DmaRegion, DrpaiPlatform},
    types::*,
};

/// 一次性完成回调
///
/// 由中断处理或强制复位取出后调用，类型保证最多调用一次。
pub struct CompletionToken(Box<dyn FnOnce(i32) + Send>);

impl CompletionToken {
    /// 四路 ODIF 全部完成
    pub const SUCCESS: i32 = 0;
    /// DRP 错误中断 (-EIO)
    pub const HW_ERROR: i32 = -5;
    /// 被强制复位中止 (-ERESTART)
    pub const RESET: i32 = -85;

    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(i32) + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// 以结果码调用回调
    pub fn complete(self, result: i32) {
        debug!("[DRPAI] completion callback, result={}", result);
        (self.0)(result)
    }
}

impl fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionToken")
    }
}

/// 特权启动路径的描述符链缓冲
#[derive(Debug)]
pub struct ScratchBuf {
    region: DmaRegion,
    /// 64 字节对齐后的起始地址
    base: PhysAddr,
}

impl ScratchBuf {
    /// 分配缓冲并写入描述符模板
    pub fn alloc(platform: &dyn DrpaiPlatform) -> DrpaiResult<Self> {
        let region = platform.alloc_coherent(DRPAI_CMA_SIZE).map_err(|e| {
            error!("[DRPAI] failed to allocate descriptor buffer: {:?}", e);
            DrpaiError::NoMemory
        })?;
        let base = PhysAddr::from(align_up(region.bus_addr.as_usize(), DRPAI_ALIGN as usize));
        let scratch = Self { region, base };

        let init = platform
            .write_phys(base, &DRP_SINGLE_DESC_BIN)
            .and_then(|_| platform.flush_dcache(region.span()));
        if let Err(e) = init {
            scratch.free(platform);
            return Err(e);
        }
        debug!(
            "[DRPAI] descriptor buffer: bus=0x{:x}, base=0x{:x}",
            region.bus_addr.as_usize(),
            base.as_usize()
        );
        Ok(scratch)
    }

    /// 写入 DRP 配置与参数的地址/大小并刷新
    pub fn program(
        &self,
        platform: &dyn DrpaiPlatform,
        drp_cfg: &DrpaiData,
        drp_param: &DrpaiData,
    ) -> DrpaiResult<()> {
        let fields = [
            (DESC_CFG_ADDR_OFFSET, drp_cfg.address),
            (DESC_CFG_SIZE_OFFSET, drp_cfg.size),
            (DESC_PARAM_ADDR_OFFSET, drp_param.address),
            (DESC_PARAM_SIZE_OFFSET, drp_param.size),
        ];
        for (offset, value) in fields {
            platform.write_phys(self.base + offset, &value.to_le_bytes())?;
        }
        platform.flush_dcache(self.region.span())
    }

    /// DRP 与 AI-MAC 的启动地址
    pub fn kick_addrs(&self) -> (u32, u32) {
        let base = self.base.as_usize() as u32;
        (base, base + DRPAI_SGL_DRP_DESC_SIZE as u32)
    }

    pub fn base(&self) -> PhysAddr {
        self.base
    }

    pub fn free(self, platform: &dyn DrpaiPlatform) {
        platform.dealloc_coherent(self.region);
    }
}

impl DrpaiDevice {
    /// 特权打开
    ///
    /// 分配描述符缓冲后执行与用户态 open 相同的会话打开；硬件初始化失败时释放缓冲。
    pub fn open_k(&self) -> DrpaiResult<()> {
        let session = self.session();
        let mut ctl = session.acquire_token()?;

        let fresh = ctl.scratch.is_none();
        if fresh {
            ctl.scratch = Some(ScratchBuf::alloc(session.platform())?);
        }
        if let Err(e) = session.open_locked(&mut ctl) {
            if fresh {
                if let Some(scratch) = ctl.scratch.take() {
                    scratch.free(session.platform());
                }
            }
            return Err(e);
        }
        info!("[DRPAI] privileged session opened");
        Ok(())
    }

    /// 特权关闭
    pub fn close_k(&self) -> DrpaiResult<()> {
        let session = self.session();
        let mut ctl = session.acquire_token()?;
        if session.is_init() {
            return Err(DrpaiError::AccessDenied);
        }

        let result = session.close_locked(&mut ctl);
        if let Some(scratch) = ctl.scratch.take() {
            scratch.free(session.platform());
        }
        info!("[DRPAI] privileged session closed");
        result
    }

    /// 特权启动
    ///
    /// `desc[0]` 为 DRP 配置，`desc[1]` 为 DRP 参数。`callback` 在中断上下文中以
    /// 结果码调用：0 成功，-5 DRP 错误，-85 被强制复位。
    pub fn start_k<F>(&self, desc: &[DrpaiData; 2], callback: F) -> DrpaiResult<()>
    where
        F: FnOnce(i32) + Send + 'static,
    {
        let session = self.session();
        let ctl = session.acquire_token()?;
        session.start_scratch(&ctl, desc, CompletionToken::new(callback))
    }
}
