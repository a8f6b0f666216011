//! 每个打开句柄的读写状态
//!
//! ```text
//! IdleRw --assign--> Assigned --write--> Writing --(写满)--> IdleRw
//!                    Assigned --read--> ReadingMem --(读完)--> IdleRw
//! IdleRw --reg_dump--> DumpingReg --read--> ReadingReg --(两个窗口读完)--> IdleRw
//! IdleRw --assign_param--> AssignedParam --write--> WritingParam --(写满)--> IdleRw
//! ```
//!
//! 本文件只维护游标与阶段，锁与区域登记由 [`crate::file::drpai::DrpaiFile`] 负责。

use alloc::vec::Vec;

use memory_addr::PhysAddr;

use super::{
    error::{DrpaiError, DrpaiResult},
    hal::DrpaiHal,
    platform::DrpaiPlatform,
    region::phys_span,
    types::{DrpaiAssignParam, DrpaiData},
};

/// 读写阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwPhase {
    IdleRw,
    Assigned,
    ReadingMem,
    Writing,
    AssignedParam,
    WritingParam,
    DumpingReg,
    ReadingReg,
}

impl RwPhase {
    /// 该阶段下句柄是否在区域表中登记了区域
    pub fn holds_region(&self) -> bool {
        matches!(self, RwPhase::Assigned | RwPhase::ReadingMem | RwPhase::Writing)
    }
}

/// 一次读写的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStep {
    /// 实际传输字节数
    pub count: usize,
    /// 本次传输后是否回到 `IdleRw`
    pub finished: bool,
    /// 完成时是否需要从区域表移除
    pub release_region: bool,
}

/// 句柄读写状态
#[derive(Debug)]
pub struct TransferState {
    pub phase: RwPhase,
    /// 已分配区域
    pub data: DrpaiData,
    pub read_count: u32,
    pub write_count: u32,
    pub drp_reg_offset: u32,
    pub aimac_reg_offset: u32,
    /// 参数描述文本
    pub param_info: Option<Vec<u8>>,
    pub assign_param: DrpaiAssignParam,
    /// 是否已通过 PREPOST_INADDR 指定输入地址
    pub input_redirect: bool,
}

impl Default for TransferState {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferState {
    pub const fn new() -> Self {
        Self {
            phase: RwPhase::IdleRw,
            data: DrpaiData::new(0, 0),
            read_count: 0,
            write_count: 0,
            drp_reg_offset: 0,
            aimac_reg_offset: 0,
            param_info: None,
            assign_param: DrpaiAssignParam {
                info_size: 0,
                obj: DrpaiData::new(0, 0),
            },
            input_redirect: false,
        }
    }

    /// IdleRw -> Assigned
    pub fn assign(&mut self, data: DrpaiData) {
        self.data = data;
        self.phase = RwPhase::Assigned;
        self.read_count = 0;
        self.write_count = 0;
    }

    /// IdleRw -> DumpingReg
    pub fn start_reg_dump(&mut self) -> DrpaiResult<()> {
        if self.phase != RwPhase::IdleRw {
            return Err(DrpaiError::AccessDenied);
        }
        self.phase = RwPhase::DumpingReg;
        self.read_count = 0;
        self.drp_reg_offset = 0;
        self.aimac_reg_offset = 0;
        Ok(())
    }

    /// IdleRw -> AssignedParam，为参数文本分配缓冲
    pub fn assign_param(&mut self, param: DrpaiAssignParam) -> DrpaiResult<()> {
        if self.phase != RwPhase::IdleRw || self.param_info.is_some() {
            return Err(DrpaiError::AccessDenied);
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(param.info_size as usize)
            .map_err(|_| DrpaiError::NoMemory)?;
        buf.resize(param.info_size as usize, 0);

        self.phase = RwPhase::AssignedParam;
        self.write_count = 0;
        self.assign_param = param;
        self.param_info = Some(buf);
        Ok(())
    }

    /// 参数文本是否可以用于修补 (已上传且不在上传过程中)
    pub fn param_blob(&self) -> DrpaiResult<&[u8]> {
        match (&self.param_info, self.phase) {
            (_, RwPhase::AssignedParam | RwPhase::WritingParam) | (None, _) => {
                Err(DrpaiError::AccessDenied)
            }
            (Some(blob), _) => Ok(blob),
        }
    }

    /// 写入数据
    ///
    /// `count` 超过剩余字节时截断。原始区域写满时刷新整个区域。
    pub fn write(&mut self, platform: &dyn DrpaiPlatform, buf: &[u8]) -> DrpaiResult<TransferStep> {
        let raw = match self.phase {
            RwPhase::Assigned | RwPhase::Writing => true,
            RwPhase::AssignedParam | RwPhase::WritingParam => false,
            _ => return Err(DrpaiError::AccessDenied),
        };
        if buf.is_empty() {
            return Err(DrpaiError::InvalidArg);
        }

        if raw {
            self.phase = RwPhase::Writing;
            self.write_mem(platform, buf)
        } else {
            self.phase = RwPhase::WritingParam;
            self.write_param(buf)
        }
    }

    fn write_mem(&mut self, platform: &dyn DrpaiPlatform, buf: &[u8]) -> DrpaiResult<TransferStep> {
        let remain = (self.data.size - self.write_count) as usize;
        let count = buf.len().min(remain);
        let addr = PhysAddr::from(self.data.address as usize + self.write_count as usize);
        platform.write_phys(addr, &buf[..count])?;
        self.write_count += count as u32;

        let finished = self.write_count >= self.data.size;
        if finished {
            platform.flush_dcache(phys_span(self.data.address, self.data.size)?)?;
            self.phase = RwPhase::IdleRw;
            self.data = DrpaiData::default();
        }
        Ok(TransferStep {
            count,
            finished,
            release_region: finished,
        })
    }

    fn write_param(&mut self, buf: &[u8]) -> DrpaiResult<TransferStep> {
        let info_size = self.assign_param.info_size;
        let remain = (info_size - self.write_count) as usize;
        let count = buf.len().min(remain);
        let start = self.write_count as usize;
        let blob = self.param_info.as_mut().ok_or(DrpaiError::Fault)?;
        blob[start..start + count].copy_from_slice(&buf[..count]);
        self.write_count += count as u32;

        let finished = self.write_count >= info_size;
        if finished {
            self.phase = RwPhase::IdleRw;
        }
        Ok(TransferStep {
            count,
            finished,
            release_region: false,
        })
    }

    /// 读取数据
    ///
    /// 寄存器转储阶段需要提供 `reg`。
    pub fn read(
        &mut self,
        platform: &dyn DrpaiPlatform,
        buf: &mut [u8],
        reg: Option<RegWindows<'_>>,
    ) -> DrpaiResult<TransferStep> {
        let mem = match self.phase {
            RwPhase::Assigned | RwPhase::ReadingMem => true,
            RwPhase::DumpingReg | RwPhase::ReadingReg => false,
            _ => return Err(DrpaiError::AccessDenied),
        };
        if buf.is_empty() {
            return Err(DrpaiError::InvalidArg);
        }

        if mem {
            self.phase = RwPhase::ReadingMem;
            self.read_mem(platform, buf)
        } else {
            self.phase = RwPhase::ReadingReg;
            let reg = reg.ok_or(DrpaiError::Fault)?;
            Ok(self.read_reg(reg, buf))
        }
    }

    fn read_mem(&mut self, platform: &dyn DrpaiPlatform, buf: &mut [u8]) -> DrpaiResult<TransferStep> {
        let remain = (self.data.size - self.read_count) as usize;
        let count = buf.len().min(remain);
        let addr = PhysAddr::from(self.data.address as usize + self.read_count as usize);
        platform.read_phys(addr, &mut buf[..count])?;
        self.read_count += count as u32;

        let finished = self.read_count >= self.data.size;
        if finished {
            self.phase = RwPhase::IdleRw;
            self.data = DrpaiData::default();
        }
        Ok(TransferStep {
            count,
            finished,
            release_region: finished,
        })
    }

    /// 按 4 字节读取寄存器，先 DRP 窗口后 AI-MAC 窗口
    ///
    /// 最后一个字放不下的字节被丢弃，返回值不超过 `buf.len()`。
    fn read_reg(&mut self, reg: RegWindows<'_>, buf: &mut [u8]) -> TransferStep {
        let total = reg.drp_size as u64 + reg.aimac_size as u64;
        let mut i = 0usize;
        let mut finished = false;

        while i < buf.len() {
            let word = if self.read_count < reg.drp_size {
                let v = reg.hal.read_drp_reg(self.drp_reg_offset);
                self.drp_reg_offset += 4;
                v
            } else {
                let v = reg.hal.read_aimac_reg(self.aimac_reg_offset);
                self.aimac_reg_offset += 4;
                v
            };
            let bytes = word.to_le_bytes();
            let n = (buf.len() - i).min(4);
            buf[i..i + n].copy_from_slice(&bytes[..n]);
            self.read_count += 4;
            i += 4;

            if self.read_count as u64 >= total {
                self.phase = RwPhase::IdleRw;
                finished = true;
                break;
            }
        }

        TransferStep {
            count: i.min(buf.len()),
            finished,
            release_region: false,
        }
    }

    /// 释放参数文本
    pub fn release_param(&mut self) {
        self.param_info = None;
    }
}

/// 寄存器窗口
#[derive(Clone, Copy)]
pub struct RegWindows<'a> {
    pub hal: &'a dyn DrpaiHal,
    pub drp_size: u32,
    pub aimac_size: u32,
}
