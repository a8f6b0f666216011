//! 物理区域校验与已分配区域登记

use alloc::collections::BTreeMap;

use memory_addr::{PhysAddr, PhysAddrRange, is_aligned};

use super::{
    DRPAI_ALIGN,
    error::{DrpaiError, DrpaiResult},
    types::DrpaiData,
};

/// 一段物理内存 `[start, end)`
pub type PhysSpan = PhysAddrRange;

/// 打开的句柄编号
pub type HandleId = u32;

/// 由 (地址, 长度) 构造物理区间，长度为零返回 `InvalidArg`，溢出返回 `OutOfRange`
pub fn phys_span(addr: u32, size: u32) -> DrpaiResult<PhysSpan> {
    if size == 0 {
        return Err(DrpaiError::InvalidArg);
    }
    let end = (addr as usize)
        .checked_add(size as usize)
        .ok_or(DrpaiError::OutOfRange)?;
    Ok(PhysAddrRange::new(
        PhysAddr::from(addr as usize),
        PhysAddr::from(end),
    ))
}

/// DRP-AI 专用保留内存校验器
#[derive(Debug, Clone, Copy)]
pub struct RegionValidator {
    reserved: PhysSpan,
}

impl RegionValidator {
    pub fn new(base: u32, size: u32) -> DrpaiResult<Self> {
        Ok(Self {
            reserved: phys_span(base, size)?,
        })
    }

    pub fn reserved(&self) -> PhysSpan {
        self.reserved
    }

    /// 检查 64 字节对齐以及是否完全落在保留区域内
    ///
    /// 不检查与其他已分配区域的重叠。
    pub fn validate(&self, data: &DrpaiData) -> DrpaiResult<PhysSpan> {
        if !is_aligned(data.address as usize, DRPAI_ALIGN as usize) {
            return Err(DrpaiError::Unaligned);
        }
        let span = phys_span(data.address, data.size)?;
        if !self.reserved.contains_range(span) {
            return Err(DrpaiError::OutOfRange);
        }
        Ok(span)
    }
}

/// 全局已分配区域表
///
/// 键为句柄编号，每个句柄同时最多登记一个区域。
#[derive(Debug, Default)]
pub struct RegionRegistry {
    entries: BTreeMap<HandleId, PhysSpan>,
}

impl RegionRegistry {
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// 检查与已登记区域是否重叠
    pub fn check_overlap(&self, span: PhysSpan) -> DrpaiResult<()> {
        if let Some((id, _)) = self.entries.iter().find(|(_, s)| s.overlaps(span)) {
            debug!(
                "[DRPAI] region {:?} overlaps region of handle {}",
                span, id
            );
            return Err(DrpaiError::Overlap);
        }
        Ok(())
    }

    /// 不重叠时登记
    pub fn insert_if_non_overlapping(&mut self, id: HandleId, span: PhysSpan) -> DrpaiResult<()> {
        if self.entries.contains_key(&id) {
            return Err(DrpaiError::AccessDenied);
        }
        self.check_overlap(span)?;
        self.entries.insert(id, span);
        Ok(())
    }

    /// 移除句柄的登记
    pub fn remove(&mut self, id: HandleId) -> Option<PhysSpan> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: HandleId) -> Option<PhysSpan> {
        self.entries.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
