//! DRP-AI 设备
//!
//! 设备对象的生命周期从 probe 到 remove，持有会话控制器、区域表与传输锁，
//! 通过 `Arc` 注入到每个打开的句柄中。

use alloc::{boxed::Box, sync::Arc};
use core::sync::atomic::{AtomicU32, Ordering};

use spin::{Mutex, MutexGuard};

use super::{
    DRPAI_DRIVER_NAME, DRPAI_DRIVER_VERSION,
    error::{DrpaiError, DrpaiResult},
    hal::DrpaiHal,
    irq::DrpaiIrq,
    platform::DrpaiPlatform,
    region::{HandleId, RegionRegistry},
    session::{DrpaiSession, lock_timeout},
    types::DrpaiPlatformCfg,
};
use crate::file::drpai::DrpaiFile;

/// DRP-AI 设备
pub struct DrpaiDevice {
    /// 硬件会话
    session: DrpaiSession,
    /// 已分配区域表
    registry: Mutex<RegionRegistry>,
    /// 读写状态机的全局传输锁
    transfer_lock: Mutex<()>,
    /// 句柄编号计数器
    next_handle: AtomicU32,
}

impl DrpaiDevice {
    /// probe：建立会话上下文，设备状态为 INIT
    pub fn probe(
        cfg: DrpaiPlatformCfg,
        hal: Box<dyn DrpaiHal>,
        platform: Box<dyn DrpaiPlatform>,
    ) -> DrpaiResult<Arc<Self>> {
        info!("DRP-AI Driver version : {}", DRPAI_DRIVER_VERSION);
        let session = DrpaiSession::new(cfg, hal, platform)?;
        info!(
            "[DRPAI] probe: region 0x{:x}+0x{:x}, linux mem 0x{:x}+0x{:x}",
            cfg.region_base, cfg.region_size, cfg.linux_mem_start, cfg.linux_mem_size
        );
        Ok(Arc::new(Self {
            session,
            registry: Mutex::new(RegionRegistry::new()),
            transfer_lock: Mutex::new(()),
            next_handle: AtomicU32::new(1),
        }))
    }

    pub fn name(&self) -> &'static str {
        DRPAI_DRIVER_NAME
    }

    pub fn session(&self) -> &DrpaiSession {
        &self.session
    }

    pub fn cfg(&self) -> &DrpaiPlatformCfg {
        self.session.cfg()
    }

    /// 打开一个句柄，首次打开时初始化硬件
    pub fn open(self: &Arc<Self>) -> DrpaiResult<DrpaiFile> {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.session.open_session()?;
        debug!("[DRPAI] open handle {}", id);
        Ok(DrpaiFile::new(self.clone(), id))
    }

    /// 中断入口
    pub fn handle_irq(&self, irq: DrpaiIrq) {
        self.session.handle_irq(irq);
    }

    /// 当前登记的区域数
    pub fn assigned_regions(&self) -> usize {
        self.registry.lock().len()
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, RegionRegistry> {
        self.registry.lock()
    }

    /// 尝试获取传输锁，被占用时返回 `Retry`
    pub(crate) fn try_transfer(&self) -> DrpaiResult<MutexGuard<'_, ()>> {
        self.transfer_lock.try_lock().ok_or(DrpaiError::Retry)
    }

    /// 在 hw_token 的超时时间内等待传输锁
    pub(crate) fn wait_transfer(&self) -> DrpaiResult<MutexGuard<'_, ()>> {
        lock_timeout(
            &self.transfer_lock,
            self.session.platform(),
            self.cfg().token_timeout_ms,
        )
    }

    pub(crate) fn release_region(&self, id: HandleId) {
        if self.registry.lock().remove(id).is_some() {
            debug!("[DRPAI] handle {} region released", id);
        }
    }
}

impl Drop for DrpaiDevice {
    fn drop(&mut self) {
        info!("[DRPAI] device removed");
    }
}
