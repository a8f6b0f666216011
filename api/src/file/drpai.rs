//! DRP-AI 设备文件
//!
//! 每次 open 得到一个 [`DrpaiFile`]，内含该句柄的读写状态机。
//! read/write/assign 等传输操作需要全局传输锁，被占用时立即返回 `Retry`；
//! start/reset/get_status 由会话的 hw_token 串行化。

use alloc::{borrow::Cow, sync::Arc};
use core::sync::atomic::{AtomicBool, Ordering};

use axerrno::{AxError, AxResult};
use axpoll::{IoEvents, Pollable};
use spin::Mutex;

use super::FileLike;
use crate::vfs::dev::drpai::{
    DrpaiDevice,
    error::{DrpaiError, DrpaiResult},
    param::{ParamField, apply_fields, crop_fields, find_crop_offsets, find_input_offset},
    platform::flush_input_area,
    region::{HandleId, phys_span},
    transfer::{RegWindows, RwPhase, TransferState},
    types::*,
};

/// 打开的 DRP-AI 句柄
pub struct DrpaiFile {
    device: Arc<DrpaiDevice>,
    id: HandleId,
    state: Mutex<TransferState>,
    closed: AtomicBool,
}

impl DrpaiFile {
    pub(crate) fn new(device: Arc<DrpaiDevice>, id: HandleId) -> Self {
        Self {
            device,
            id,
            state: Mutex::new(TransferState::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn handle_id(&self) -> HandleId {
        self.id
    }

    pub fn device(&self) -> &Arc<DrpaiDevice> {
        &self.device
    }

    /// 当前读写阶段
    pub fn phase(&self) -> RwPhase {
        self.state.lock().phase
    }

    /// 是否已通过 PREPOST_INADDR 指定输入地址
    pub fn input_redirected(&self) -> bool {
        self.state.lock().input_redirect
    }

    /// 已关闭的句柄拒绝一切操作
    fn ensure_open(&self) -> DrpaiResult<()> {
        if self.closed.load(Ordering::Acquire) {
            warn!("[DRPAI] handle {} used after close", self.id);
            return Err(DrpaiError::AccessDenied);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // 传输
    // ------------------------------------------------------------------

    /// DRPAI_ASSIGN：登记一个待读写的物理区域
    pub fn assign(&self, data: &DrpaiData) -> DrpaiResult<()> {
        self.ensure_open()?;
        let _transfer = self.device.try_transfer()?;
        let mut st = self.state.lock();
        if st.phase != RwPhase::IdleRw {
            return Err(DrpaiError::AccessDenied);
        }

        let session = self.device.session();
        let span = session.validator().validate(data).inspect_err(|e| {
            warn!(
                "[DRPAI] assign 0x{:x}+0x{:x} rejected: {:?}",
                data.address, data.size, e
            );
        })?;
        {
            let mut registry = self.device.registry();
            registry.check_overlap(span)?;
            session.platform().invalidate_dcache(span)?;
            registry.insert_if_non_overlapping(self.id, span)?;
        }
        st.assign(*data);
        debug!(
            "[DRPAI] handle {} assigned 0x{:x}+0x{:x}",
            self.id, data.address, data.size
        );
        Ok(())
    }

    /// 向已分配区域或参数文本写入
    pub fn write(&self, buf: &[u8]) -> DrpaiResult<usize> {
        self.ensure_open()?;
        let _transfer = self.device.try_transfer()?;
        let mut st = self.state.lock();
        let step = st.write(self.device.session().platform(), buf)?;
        if step.release_region {
            self.device.release_region(self.id);
        }
        Ok(step.count)
    }

    /// 从已分配区域或寄存器窗口读取
    pub fn read(&self, buf: &mut [u8]) -> DrpaiResult<usize> {
        self.ensure_open()?;
        let _transfer = self.device.try_transfer()?;
        let mut st = self.state.lock();
        let session = self.device.session();

        let reg_phase = matches!(st.phase, RwPhase::DumpingReg | RwPhase::ReadingReg);
        let step = if reg_phase && !buf.is_empty() {
            let _ctl = session.acquire_token()?;
            let cfg = session.cfg();
            let windows = RegWindows {
                hal: session.hal(),
                drp_size: cfg.drp_reg_size,
                aimac_size: cfg.aimac_reg_size,
            };
            st.read(session.platform(), buf, Some(windows))?
        } else {
            st.read(session.platform(), buf, None)?
        };

        if step.release_region {
            self.device.release_region(self.id);
        }
        Ok(step.count)
    }

    /// DRPAI_REG_DUMP：之后的 read 依次返回 DRP 与 AI-MAC 寄存器
    pub fn reg_dump(&self) -> DrpaiResult<()> {
        self.ensure_open()?;
        let _transfer = self.device.wait_transfer()?;
        self.state.lock().start_reg_dump()?;
        debug!("[DRPAI] handle {} register dump", self.id);
        Ok(())
    }

    /// DRPAI_ASSIGN_PARAM：准备接收参数描述文本
    pub fn assign_param(&self, param: &DrpaiAssignParam) -> DrpaiResult<()> {
        self.ensure_open()?;
        let _transfer = self.device.try_transfer()?;
        let mut st = self.state.lock();
        if st.phase != RwPhase::IdleRw || st.param_info.is_some() {
            return Err(DrpaiError::AccessDenied);
        }
        if param.info_size == 0 {
            return Err(DrpaiError::InvalidArg);
        }
        let obj = phys_span(param.obj.address, param.obj.size).map_err(|_| DrpaiError::InvalidArg)?;
        if !self.device.session().validator().reserved().contains_range(obj) {
            return Err(DrpaiError::InvalidArg);
        }
        st.assign_param(*param)?;
        debug!(
            "[DRPAI] handle {} assign param, info_size={}",
            self.id, param.info_size
        );
        Ok(())
    }

    /// DRPAI_PREPOST_CROP：修补 crop 节点及其后继节点的参数
    pub fn prepost_crop(&self, crop: &DrpaiCrop) -> DrpaiResult<()> {
        self.ensure_open()?;
        let session = self.device.session();
        if session.is_running() {
            return Err(DrpaiError::Busy);
        }
        let _transfer = self.device.try_transfer()?;
        let st = self.state.lock();
        let blob = st.param_blob()?;
        if st.assign_param.obj != crop.obj {
            return Err(DrpaiError::InvalidArg);
        }

        let (offset0, offset1) = find_crop_offsets(blob)?;
        let fields = crop_fields(crop, offset0, offset1)?;
        apply_fields(session.platform(), &crop.obj, &fields)?;
        debug!(
            "[DRPAI] crop {}x{} at ({}, {}), offsets {}/{}",
            crop.img_owidth, crop.img_oheight, crop.pos_x, crop.pos_y, offset0, offset1
        );
        Ok(())
    }

    /// DRPAI_PREPOST_INADDR：把指定输入节点的读地址改为 `inout.data`
    ///
    /// 成功后本句柄的 start 不再修补 DRP 参数中的输入地址。
    pub fn prepost_inaddr(&self, inout: &DrpaiInout) -> DrpaiResult<()> {
        self.ensure_open()?;
        let session = self.device.session();
        if session.is_running() {
            return Err(DrpaiError::Busy);
        }
        let _transfer = self.device.try_transfer()?;
        let mut st = self.state.lock();
        let offset = {
            let blob = st.param_blob()?;
            if st.assign_param.obj != inout.obj {
                return Err(DrpaiError::InvalidArg);
            }
            find_input_offset(blob, inout.node_name())?
        };

        flush_input_area(session.platform(), &inout.data, session.cfg())?;
        let field = ParamField::U32 {
            offset: offset.checked_add(DRP_PARAM_RADDR).ok_or(DrpaiError::Fault)?,
            value: inout.data.address,
        };
        apply_fields(session.platform(), &inout.obj, &[field])?;
        st.input_redirect = true;
        debug!(
            "[DRPAI] input address of node at {} set to 0x{:x}",
            offset, inout.data.address
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // 会话
    // ------------------------------------------------------------------

    /// DRPAI_START
    pub fn start(&self, proc: &[DrpaiData; DRPAI_INDEX_NUM]) -> DrpaiResult<()> {
        self.ensure_open()?;
        let input_redirect = self.state.lock().input_redirect;
        self.device.session().start_run(proc, input_redirect)
    }

    /// DRPAI_RESET
    pub fn reset(&self) -> DrpaiResult<()> {
        self.ensure_open()?;
        self.device.session().force_reset()
    }

    /// DRPAI_GET_STATUS，运行中返回 `Busy`，有硬件错误返回 `IoFault`
    pub fn get_status(&self) -> DrpaiResult<DrpaiStatusInfo> {
        self.ensure_open()?;
        let status = self.device.session().get_status()?;
        status.check()?;
        Ok(status)
    }

    /// 关闭句柄
    ///
    /// 释放登记的区域与参数文本，并递减会话引用计数。
    /// 等待锁超时返回 `Timeout`，此时句柄保持打开且区域仍被登记，可以重试。
    /// 关闭后的其它操作返回 `AccessDenied`。
    pub fn close(&self) -> DrpaiResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.close_inner() {
            Err(DrpaiError::Timeout) => {
                self.closed.store(false, Ordering::Release);
                Err(DrpaiError::Timeout)
            }
            result => result,
        }
    }

    /// 持有传输锁完成会话关闭；仅在会话关闭未超时时释放区域与参数文本
    fn close_inner(&self) -> DrpaiResult<()> {
        let _transfer = self.device.wait_transfer()?;
        let result = self.device.session().close_session();
        if matches!(result, Err(DrpaiError::Timeout)) {
            return result;
        }

        let mut st = self.state.lock();
        if st.phase.holds_region() {
            self.device.release_region(self.id);
        }
        st.release_param();
        st.phase = RwPhase::IdleRw;
        debug!("[DRPAI] handle {} closed", self.id);
        result
    }

    // ------------------------------------------------------------------
    // ioctl
    // ------------------------------------------------------------------

    /// ioctl 分发，`arg` 为调用者结构体的地址
    pub fn handle_ioctl(&self, cmd: u32, arg: usize) -> DrpaiResult<usize> {
        self.ensure_open()?;
        match cmd {
            DRPAI_ASSIGN => {
                let data = unsafe { read_arg::<DrpaiData>(arg)? };
                self.assign(&data)?;
            }
            DRPAI_START => {
                let proc = unsafe { read_arg::<[DrpaiData; DRPAI_INDEX_NUM]>(arg)? };
                self.start(&proc)?;
            }
            DRPAI_RESET => self.reset()?,
            DRPAI_GET_STATUS => {
                let status = self.device.session().get_status()?;
                unsafe { write_arg(arg, status)? };
                status.check()?;
            }
            DRPAI_REG_DUMP => self.reg_dump()?,
            DRPAI_ASSIGN_PARAM => {
                let param = unsafe { read_arg::<DrpaiAssignParam>(arg)? };
                self.assign_param(&param)?;
            }
            DRPAI_PREPOST_CROP => {
                let crop = unsafe { read_arg::<DrpaiCrop>(arg)? };
                self.prepost_crop(&crop)?;
            }
            DRPAI_PREPOST_INADDR => {
                let inout = unsafe { read_arg::<DrpaiInout>(arg)? };
                self.prepost_inaddr(&inout)?;
            }
            _ => {
                warn!("[DRPAI] unknown ioctl command: 0x{:x}", cmd);
                return Err(DrpaiError::Fault);
            }
        }
        Ok(0)
    }
}

/// 从调用者地址读取参数
///
/// # Safety
///
/// `arg` 非零时必须指向一个有效的 `T`
unsafe fn read_arg<T: Copy>(arg: usize) -> DrpaiResult<T> {
    if arg == 0 {
        return Err(DrpaiError::Fault);
    }
    Ok(unsafe { core::ptr::read_unaligned(arg as *const T) })
}

/// 把结果写回调用者地址
///
/// # Safety
///
/// `arg` 非零时必须指向可写的 `T`
unsafe fn write_arg<T: Copy>(arg: usize, value: T) -> DrpaiResult<()> {
    if arg == 0 {
        return Err(DrpaiError::Fault);
    }
    unsafe { core::ptr::write_unaligned(arg as *mut T, value) };
    Ok(())
}

impl Pollable for DrpaiFile {
    fn poll(&self) -> IoEvents {
        if self.device.session().is_ready() {
            IoEvents::IN
        } else {
            IoEvents::empty()
        }
    }

    fn register(&self, context: &mut core::task::Context<'_>, events: IoEvents) {
        if events.contains(IoEvents::IN) {
            self.device.session().poll_set().register(context.waker());
        }
    }
}

impl FileLike for DrpaiFile {
    fn read(&self, buf: &mut [u8]) -> AxResult<usize> {
        DrpaiFile::read(self, buf).map_err(AxError::from)
    }

    fn write(&self, buf: &[u8]) -> AxResult<usize> {
        DrpaiFile::write(self, buf).map_err(AxError::from)
    }

    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed("/dev/drpai0")
    }

    fn ioctl(&self, cmd: u32, arg: usize) -> AxResult<usize> {
        debug!("[DRPAI] ioctl: cmd=0x{:x}, arg=0x{:x}", cmd, arg);
        self.handle_ioctl(cmd, arg).map_err(|e| {
            if !e.is_retryable() {
                error!("[DRPAI] ioctl 0x{:x} failed: {}", cmd, e);
            }
            AxError::from(e)
        })
    }
}

impl Drop for DrpaiFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("[DRPAI] failed to close handle {}: {}", self.id, e);
        }
    }
}
