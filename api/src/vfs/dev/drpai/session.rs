//! 全局硬件会话
//!
//! - `hw_token`：带超时的互斥令牌，串行化 open/close/start/reset/get_status，
//!   同时保护引用计数与特权调用者的 DMA 描述符缓冲。
//! - `state`：可在中断上下文获取的自旋锁，保护状态/错误码/ODIF 计数/完成回调。

use alloc::boxed::Box;

use axpoll::PollSet;
use kspin::SpinNoIrq;
use memory_addr::PhysAddr;
use spin::{Mutex, MutexGuard};

use super::{
    DESC_LINK_BYTE, DESC_LINK_OFFSET_FROM_END, DRPAI_CHANNEL, DRPAI_DESC_CMD_SIZE,
    error::{DrpaiError, DrpaiResult},
    hal::{DrpaiHal, OdifIntCount},
    kernel::{CompletionToken, ScratchBuf},
    platform::{DrpaiPlatform, cpg_init, flush_input_area, param_change32},
    region::{RegionValidator, phys_span},
    types::*,
};

/// 在给定时间内反复尝试获取自旋锁
pub fn lock_timeout<'a, T>(
    lock: &'a Mutex<T>,
    platform: &dyn DrpaiPlatform,
    timeout_ms: u64,
) -> DrpaiResult<MutexGuard<'a, T>> {
    let start = platform.now_us();
    let timeout_us = timeout_ms.saturating_mul(1000);
    loop {
        if let Some(guard) = lock.try_lock() {
            return Ok(guard);
        }
        if platform.timeout_check(start, timeout_us) {
            return Err(DrpaiError::Timeout);
        }
        platform.relax();
    }
}

/// 由 `hw_token` 保护的数据
#[derive(Debug)]
pub struct SessionCtl {
    /// 引用计数，probe 后为 1
    pub ref_count: u32,
    /// 特权调用者的描述符缓冲
    pub scratch: Option<ScratchBuf>,
}

/// 由 `status_lock` 保护的数据
pub struct SessionState {
    pub status: DrpaiStatusInfo,
    /// 轮询就绪标志 (AI-MAC 正常/错误或 DRP 错误后置位)
    pub ready: bool,
    /// 本次运行累计的 ODIF 完成计数
    pub lanes: OdifIntCount,
    /// 特权调用者注册的一次性完成回调
    pub callback: Option<CompletionToken>,
}

impl SessionState {
    fn status_code(&self) -> DrpaiStatusCode {
        self.status.status_code().unwrap_or(DrpaiStatusCode::Init)
    }

    pub(super) fn set_status(&mut self, status: DrpaiStatusCode) {
        self.status.status = status.into();
    }

    pub(super) fn set_err(&mut self, err: DrpaiErrInfo) {
        self.status.err = err.into();
    }

    fn has_hw_error(&self) -> bool {
        matches!(
            self.status.err_info(),
            Some(DrpaiErrInfo::DrpErr | DrpaiErrInfo::AimacErr)
        )
    }

    /// 进入 RUN：清除错误码、就绪标志与 ODIF 计数
    fn commit_run(&mut self) {
        self.set_err(DrpaiErrInfo::Success);
        self.set_status(DrpaiStatusCode::Run);
        self.ready = false;
        self.lanes = OdifIntCount::default();
    }
}

/// 硬件会话控制器
pub struct DrpaiSession {
    cfg: DrpaiPlatformCfg,
    pub(super) hal: Box<dyn DrpaiHal>,
    pub(super) platform: Box<dyn DrpaiPlatform>,
    validator: RegionValidator,
    hw_token: Mutex<SessionCtl>,
    pub(super) state: SpinNoIrq<SessionState>,
    pub(super) poll_set: PollSet,
}

impl DrpaiSession {
    pub fn new(
        cfg: DrpaiPlatformCfg,
        hal: Box<dyn DrpaiHal>,
        platform: Box<dyn DrpaiPlatform>,
    ) -> DrpaiResult<Self> {
        let validator = RegionValidator::new(cfg.region_base, cfg.region_size)?;
        Ok(Self {
            cfg,
            hal,
            platform,
            validator,
            hw_token: Mutex::new(SessionCtl {
                ref_count: 1,
                scratch: None,
            }),
            state: SpinNoIrq::new(SessionState {
                status: DrpaiStatusInfo::initial(),
                ready: false,
                lanes: OdifIntCount::default(),
                callback: None,
            }),
            poll_set: PollSet::new(),
        })
    }

    pub fn cfg(&self) -> &DrpaiPlatformCfg {
        &self.cfg
    }

    pub fn validator(&self) -> &RegionValidator {
        &self.validator
    }

    pub fn platform(&self) -> &dyn DrpaiPlatform {
        self.platform.as_ref()
    }

    pub fn hal(&self) -> &dyn DrpaiHal {
        self.hal.as_ref()
    }

    /// 获取 hw_token (带超时)
    pub fn acquire_token(&self) -> DrpaiResult<MutexGuard<'_, SessionCtl>> {
        lock_timeout(&self.hw_token, self.platform(), self.cfg.token_timeout_ms).inspect_err(
            |_| warn!("[DRPAI] timed out waiting for hw_token"),
        )
    }

    /// 当前引用计数，等待 hw_token 超时返回 `Timeout`
    pub fn ref_count(&self) -> DrpaiResult<u32> {
        Ok(self.acquire_token()?.ref_count)
    }

    /// 不获取 hw_token 的状态快照
    pub fn status_snapshot(&self) -> DrpaiStatusInfo {
        self.state.lock().status
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().status.is_running()
    }

    /// 轮询就绪标志
    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    pub fn poll_set(&self) -> &PollSet {
        &self.poll_set
    }

    // ------------------------------------------------------------------
    // 硬件初始化
    // ------------------------------------------------------------------

    /// 置位就绪标志并打开两个引擎
    fn init_device(&self) {
        self.state.lock().ready = true;
        self.hal.drp_open(DRPAI_CHANNEL);
        self.hal.aimac_open(DRPAI_CHANNEL);
    }

    /// 依次复位 DRP、AI-MAC、CPG
    fn reset_device(&self) -> DrpaiResult<()> {
        self.hal
            .drp_reset(DRPAI_CHANNEL)
            .and_then(|_| self.hal.aimac_reset(DRPAI_CHANNEL))
            .and_then(|_| self.hal.cpg_reset())
            .map_err(|e| {
                error!("[DRPAI] hardware reset failed: {:?}", e);
                DrpaiError::IoFault
            })
    }

    /// 首次打开时的上电流程，失败时关闭时钟
    fn bring_up(&self) -> DrpaiResult<()> {
        info!("[DRPAI] initialize DRP-AI");
        let result = cpg_init(self.platform()).and_then(|_| {
            self.init_device();
            self.reset_device()
        });
        if let Err(e) = result {
            self.platform.clock_disable();
            return Err(e);
        }
        self.init_device();
        self.state.lock().set_status(DrpaiStatusCode::Idle);
        Ok(())
    }

    // ------------------------------------------------------------------
    // 会话操作
    // ------------------------------------------------------------------

    /// 打开会话
    pub fn open_session(&self) -> DrpaiResult<()> {
        let mut ctl = self.acquire_token()?;
        self.open_locked(&mut ctl)
    }

    pub(super) fn open_locked(&self, ctl: &mut SessionCtl) -> DrpaiResult<()> {
        if ctl.ref_count == 1 {
            self.bring_up()?;
        }
        ctl.ref_count += 1;
        debug!("[DRPAI] open session, ref_count={}", ctl.ref_count);
        Ok(())
    }

    /// 关闭会话
    ///
    /// 最后一个会话关闭时复位硬件并关闭时钟。复位失败也会完成关闭并递减引用计数。
    pub fn close_session(&self) -> DrpaiResult<()> {
        let mut ctl = self.acquire_token()?;
        self.close_locked(&mut ctl)
    }

    pub(super) fn close_locked(&self, ctl: &mut SessionCtl) -> DrpaiResult<()> {
        let mut result = Ok(());
        if ctl.ref_count == 2 {
            info!("[DRPAI] last session closed, reset DRP-AI");
            result = self.reset_device();
            self.platform.clock_disable();
            let mut st = self.state.lock();
            st.set_status(DrpaiStatusCode::Init);
            st.set_err(DrpaiErrInfo::Success);
        }
        ctl.ref_count = ctl.ref_count.saturating_sub(1);
        debug!("[DRPAI] close session, ref_count={}", ctl.ref_count);
        result
    }

    /// 获取状态快照
    ///
    /// 只有等待 hw_token 超时才返回错误；Busy / IoFault 由 [`DrpaiStatusInfo::check`] 给出。
    pub fn get_status(&self) -> DrpaiResult<DrpaiStatusInfo> {
        let _ctl = self.acquire_token()?;
        let mut st = self.state.lock();
        self.hal.refresh_status(DRPAI_CHANNEL, &mut st.status);
        Ok(st.status)
    }

    /// 强制复位
    ///
    /// 复位后状态为 IDLE、错误码为 RESET，唤醒等待者，并以 `-85` 通知已注册的回调。
    pub fn force_reset(&self) -> DrpaiResult<()> {
        let _ctl = self.acquire_token()?;
        info!("[DRPAI] reset DRP-AI");
        self.reset_device()?;
        self.init_device();

        let callback = {
            let mut st = self.state.lock();
            st.set_err(DrpaiErrInfo::Reset);
            st.set_status(DrpaiStatusCode::Idle);
            st.callback.take()
        };
        self.poll_set.wake();
        if let Some(token) = callback {
            token.complete(CompletionToken::RESET);
        }
        Ok(())
    }

    /// 检查 RUN / INIT 状态
    fn check_startable(&self, reject_hw_error: bool) -> DrpaiResult<()> {
        let st = self.state.lock();
        if reject_hw_error && st.has_hw_error() {
            return Err(DrpaiError::IoFault);
        }
        match st.status_code() {
            DrpaiStatusCode::Run => Err(DrpaiError::Busy),
            DrpaiStatusCode::Init => Err(DrpaiError::AccessDenied),
            DrpaiStatusCode::Idle => Ok(()),
        }
    }

    /// 在描述符末尾写入链接字节并刷新该字节
    fn write_link_byte(&self, desc: &DrpaiData) -> DrpaiResult<()> {
        let addr = desc.address + desc.size - DESC_LINK_OFFSET_FROM_END;
        self.platform
            .write_phys(PhysAddr::from(addr as usize), &[DESC_LINK_BYTE])?;
        self.platform.flush_dcache(phys_span(addr, 1)?)
    }

    /// 启动一次推理
    ///
    /// 先完成全部参数检查，再修补输入地址与链接字节，最后置 RUN 并启动两个引擎。
    pub fn start_run(&self, proc: &[DrpaiData; DRPAI_INDEX_NUM], input_redirect: bool) -> DrpaiResult<()> {
        let _ctl = self.acquire_token()?;
        self.check_startable(false)?;

        for desc in &proc[DRPAI_INDEX_DRP_DESC..] {
            self.validator
                .validate(desc)
                .map_err(|_| DrpaiError::InvalidArg)?;
        }
        let drp_desc = proc[DRPAI_INDEX_DRP_DESC];
        let aimac_desc = proc[DRPAI_INDEX_AIMAC_DESC];
        if drp_desc.size as usize % DRPAI_DESC_CMD_SIZE != 0
            || aimac_desc.size as usize % DRPAI_DESC_CMD_SIZE != 0
        {
            warn!("[DRPAI] descriptor size not a multiple of 16");
            return Err(DrpaiError::InvalidArg);
        }

        if !input_redirect {
            let input = proc[DRPAI_INDEX_INPUT];
            flush_input_area(self.platform(), &input, &self.cfg)?;
            param_change32(
                self.platform(),
                proc[DRPAI_INDEX_DRP_PARAM].address,
                DRP_PARAM_RADDR,
                input.address,
            )?;
        }
        self.write_link_byte(&drp_desc)?;
        self.write_link_byte(&aimac_desc)?;

        self.state.lock().commit_run();
        debug!(
            "[DRPAI] start: drp_desc=0x{:x}, aimac_desc=0x{:x}",
            drp_desc.address, aimac_desc.address
        );

        self.hal.drp_start(DRPAI_CHANNEL, drp_desc.address);
        self.hal.aimac_start(DRPAI_CHANNEL, aimac_desc.address);
        Ok(())
    }

    /// 特权调用者启动：以 scratch 中的描述符链启动，并注册完成回调
    pub(super) fn start_scratch(
        &self,
        ctl: &SessionCtl,
        cfg_param: &[DrpaiData; 2],
        callback: CompletionToken,
    ) -> DrpaiResult<()> {
        self.check_startable(true)?;
        let scratch = ctl.scratch.as_ref().ok_or(DrpaiError::AccessDenied)?;
        for desc in cfg_param {
            if !memory_addr::is_aligned(desc.address as usize, super::DRPAI_ALIGN as usize) {
                return Err(DrpaiError::InvalidArg);
            }
        }
        scratch.program(self.platform(), &cfg_param[0], &cfg_param[1])?;

        {
            let mut st = self.state.lock();
            st.commit_run();
            st.callback = Some(callback);
        }

        let (drp_addr, aimac_addr) = scratch.kick_addrs();
        debug!(
            "[DRPAI] start_k: drp=0x{:x}, aimac=0x{:x}",
            drp_addr, aimac_addr
        );
        self.hal.drp_start(DRPAI_CHANNEL, drp_addr);
        self.hal.aimac_start(DRPAI_CHANNEL, aimac_addr);
        Ok(())
    }

    /// 设备状态是否为 INIT
    pub(super) fn is_init(&self) -> bool {
        self.state.lock().status_code() == DrpaiStatusCode::Init
    }
}
