//! Shared mock HAL and platform for the integration tests.
//!
//! Physical memory is a flat `Vec<u8>` covering `[0, MEM_SIZE)`. The reserved
//! accelerator region is `[0, 0x100000)` and the linux window follows it.

#![allow(dead_code)]

use std::{
    sync::{
        Arc, Barrier, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    task::{Wake, Waker},
    time::Instant,
};

use drpai_api::vfs::dev::drpai::*;
use memory_addr::PhysAddr;

pub const MEM_SIZE: usize = 0x20_0000;
pub const REGION_BASE: u32 = 0;
pub const REGION_SIZE: u32 = 0x10_0000;
pub const LINUX_MEM_START: u32 = 0x10_0000;
pub const LINUX_MEM_SIZE: u32 = 0x10_0000;
/// Unaligned on purpose, the scratch buffer must align it up.
pub const COHERENT_ADDR: usize = 0x18_0010;

pub const DRP_REG_TAG: u32 = 0xD000_0000;
pub const AIMAC_REG_TAG: u32 = 0xA000_0000;

pub fn test_cfg() -> DrpaiPlatformCfg {
    DrpaiPlatformCfg {
        region_base: REGION_BASE,
        region_size: REGION_SIZE,
        linux_mem_start: LINUX_MEM_START,
        linux_mem_size: LINUX_MEM_SIZE,
        drp_reg_size: 600,
        aimac_reg_size: 600,
        token_timeout_ms: 50,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Drp,
    Aimac,
}

#[derive(Default)]
pub struct HalInner {
    pub opens: AtomicUsize,
    pub drp_resets: AtomicUsize,
    pub aimac_resets: AtomicUsize,
    pub cpg_resets: AtomicUsize,
    pub fail_reset: AtomicBool,
    pub starts: Mutex<Vec<(Engine, u32)>>,
    pub lanes: Mutex<OdifIntCount>,
    pub refreshes: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MockHal(pub Arc<HalInner>);

impl MockHal {
    pub fn set_fail_reset(&self, fail: bool) {
        self.0.fail_reset.store(fail, Ordering::SeqCst);
    }

    /// Lane counts reported by the next DRP-normal interrupt.
    pub fn set_lanes(&self, lanes: OdifIntCount) {
        *self.0.lanes.lock().unwrap() = lanes;
    }

    pub fn starts(&self) -> Vec<(Engine, u32)> {
        self.0.starts.lock().unwrap().clone()
    }

    pub fn drp_resets(&self) -> usize {
        self.0.drp_resets.load(Ordering::SeqCst)
    }

    pub fn cpg_resets(&self) -> usize {
        self.0.cpg_resets.load(Ordering::SeqCst)
    }

    fn reset_result(&self) -> DrpaiResult<()> {
        if self.0.fail_reset.load(Ordering::SeqCst) {
            Err(DrpaiError::IoFault)
        } else {
            Ok(())
        }
    }
}

impl DrpaiHal for MockHal {
    fn drp_open(&self, _ch: u32) {
        self.0.opens.fetch_add(1, Ordering::SeqCst);
    }

    fn aimac_open(&self, _ch: u32) {}

    fn drp_reset(&self, _ch: u32) -> DrpaiResult<()> {
        self.0.drp_resets.fetch_add(1, Ordering::SeqCst);
        self.reset_result()
    }

    fn aimac_reset(&self, _ch: u32) -> DrpaiResult<()> {
        self.0.aimac_resets.fetch_add(1, Ordering::SeqCst);
        self.reset_result()
    }

    fn cpg_reset(&self) -> DrpaiResult<()> {
        self.0.cpg_resets.fetch_add(1, Ordering::SeqCst);
        self.reset_result()
    }

    fn drp_start(&self, _ch: u32, desc_addr: u32) {
        self.0.starts.lock().unwrap().push((Engine::Drp, desc_addr));
    }

    fn aimac_start(&self, _ch: u32, desc_addr: u32) {
        self.0.starts.lock().unwrap().push((Engine::Aimac, desc_addr));
    }

    fn drp_nmlint(&self, _ch: u32) -> OdifIntCount {
        core::mem::take(&mut *self.0.lanes.lock().unwrap())
    }

    fn drp_errint(&self, _ch: u32) {}

    fn aimac_nmlint(&self, _ch: u32) {}

    fn aimac_errint(&self, _ch: u32) {}

    fn refresh_status(&self, _ch: u32, _status: &mut DrpaiStatusInfo) {
        self.0.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn read_drp_reg(&self, offset: u32) -> u32 {
        DRP_REG_TAG | offset
    }

    fn read_aimac_reg(&self, offset: u32) -> u32 {
        AIMAC_REG_TAG | offset
    }
}

/// Parks the next `write_phys` until the test releases it.
pub struct WriteGate {
    entered: Barrier,
    release: Barrier,
}

impl WriteGate {
    /// Blocks until the gated write has started.
    pub fn wait_entered(&self) {
        self.entered.wait();
    }

    /// Lets the gated write finish.
    pub fn release(&self) {
        self.release.wait();
    }

    fn pass(&self) {
        self.entered.wait();
        self.release.wait();
    }
}

pub struct PlatformInner {
    pub mem: Mutex<Vec<u8>>,
    pub write_gate: Mutex<Option<Arc<WriteGate>>>,
    pub flushes: Mutex<Vec<(usize, usize)>>,
    pub invalidates: Mutex<Vec<(usize, usize)>>,
    pub clock_enables: AtomicUsize,
    pub clock_disables: AtomicUsize,
    pub reset_ready: AtomicBool,
    pub fail_alloc: AtomicBool,
    pub allocs: AtomicUsize,
    pub deallocs: AtomicUsize,
    pub epoch: Instant,
}

#[derive(Clone)]
pub struct MockPlatform(pub Arc<PlatformInner>);

impl Default for MockPlatform {
    fn default() -> Self {
        Self(Arc::new(PlatformInner {
            mem: Mutex::new(vec![0; MEM_SIZE]),
            write_gate: Mutex::new(None),
            flushes: Mutex::new(Vec::new()),
            invalidates: Mutex::new(Vec::new()),
            clock_enables: AtomicUsize::new(0),
            clock_disables: AtomicUsize::new(0),
            reset_ready: AtomicBool::new(true),
            fail_alloc: AtomicBool::new(false),
            allocs: AtomicUsize::new(0),
            deallocs: AtomicUsize::new(0),
            epoch: Instant::now(),
        }))
    }
}

impl MockPlatform {
    pub fn peek(&self, addr: u32, len: usize) -> Vec<u8> {
        let addr = addr as usize;
        self.0.mem.lock().unwrap()[addr..addr + len].to_vec()
    }

    pub fn peek_u16(&self, addr: u32) -> u16 {
        u16::from_le_bytes(self.peek(addr, 2).try_into().unwrap())
    }

    pub fn peek_u32(&self, addr: u32) -> u32 {
        u32::from_le_bytes(self.peek(addr, 4).try_into().unwrap())
    }

    pub fn poke(&self, addr: u32, data: &[u8]) {
        let addr = addr as usize;
        self.0.mem.lock().unwrap()[addr..addr + data.len()].copy_from_slice(data);
    }

    pub fn flushes(&self) -> Vec<(usize, usize)> {
        self.0.flushes.lock().unwrap().clone()
    }

    pub fn invalidates(&self) -> Vec<(usize, usize)> {
        self.0.invalidates.lock().unwrap().clone()
    }

    pub fn clock_enables(&self) -> usize {
        self.0.clock_enables.load(Ordering::SeqCst)
    }

    pub fn clock_disables(&self) -> usize {
        self.0.clock_disables.load(Ordering::SeqCst)
    }

    pub fn allocs(&self) -> usize {
        self.0.allocs.load(Ordering::SeqCst)
    }

    pub fn deallocs(&self) -> usize {
        self.0.deallocs.load(Ordering::SeqCst)
    }

    pub fn set_reset_ready(&self, ready: bool) {
        self.0.reset_ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_fail_alloc(&self, fail: bool) {
        self.0.fail_alloc.store(fail, Ordering::SeqCst);
    }

    /// Gates the next physical write, see [`WriteGate`].
    pub fn gate_next_write(&self) -> Arc<WriteGate> {
        let gate = Arc::new(WriteGate {
            entered: Barrier::new(2),
            release: Barrier::new(2),
        });
        *self.0.write_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn check(addr: usize, len: usize) -> DrpaiResult<()> {
        match addr.checked_add(len) {
            Some(end) if end <= MEM_SIZE => Ok(()),
            _ => Err(DrpaiError::Fault),
        }
    }
}

impl DrpaiPlatform for MockPlatform {
    fn read_phys(&self, addr: PhysAddr, buf: &mut [u8]) -> DrpaiResult<()> {
        let addr = addr.as_usize();
        Self::check(addr, buf.len())?;
        buf.copy_from_slice(&self.0.mem.lock().unwrap()[addr..addr + buf.len()]);
        Ok(())
    }

    fn write_phys(&self, addr: PhysAddr, data: &[u8]) -> DrpaiResult<()> {
        let addr = addr.as_usize();
        Self::check(addr, data.len())?;
        let gate = self.0.write_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.pass();
        }
        self.0.mem.lock().unwrap()[addr..addr + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn flush_dcache(&self, span: PhysSpan) -> DrpaiResult<()> {
        self.0
            .flushes
            .lock()
            .unwrap()
            .push((span.start.as_usize(), span.size()));
        Ok(())
    }

    fn invalidate_dcache(&self, span: PhysSpan) -> DrpaiResult<()> {
        self.0
            .invalidates
            .lock()
            .unwrap()
            .push((span.start.as_usize(), span.size()));
        Ok(())
    }

    fn clock_enable(&self) {
        self.0.clock_enables.fetch_add(1, Ordering::SeqCst);
    }

    fn clock_disable(&self) {
        self.0.clock_disables.fetch_add(1, Ordering::SeqCst);
    }

    fn reset_control_reset(&self) {}

    fn reset_control_status(&self) -> bool {
        self.0.reset_ready.load(Ordering::SeqCst)
    }

    fn alloc_coherent(&self, size: usize) -> DrpaiResult<DmaRegion> {
        if self.0.fail_alloc.load(Ordering::SeqCst) {
            return Err(DrpaiError::NoMemory);
        }
        self.0.allocs.fetch_add(1, Ordering::SeqCst);
        Ok(DmaRegion {
            bus_addr: PhysAddr::from(COHERENT_ADDR),
            size,
        })
    }

    fn dealloc_coherent(&self, _region: DmaRegion) {
        self.0.deallocs.fetch_add(1, Ordering::SeqCst);
    }

    fn now_us(&self) -> u64 {
        self.0.epoch.elapsed().as_micros() as u64
    }

    fn udelay(&self, _us: u32) {}
}

pub struct Fixture {
    pub dev: Arc<DrpaiDevice>,
    pub hal: MockHal,
    pub platform: MockPlatform,
}

pub fn setup() -> Fixture {
    let hal = MockHal::default();
    let platform = MockPlatform::default();
    let dev = DrpaiDevice::probe(test_cfg(), Box::new(hal.clone()), Box::new(platform.clone()))
        .expect("probe");
    Fixture { dev, hal, platform }
}

/// A valid start payload: every region 64-byte aligned and inside the
/// reserved region, input inside the linux window.
pub fn proc_descs() -> [DrpaiData; DRPAI_INDEX_NUM] {
    let mut proc = [DrpaiData::default(); DRPAI_INDEX_NUM];
    proc[DRPAI_INDEX_INPUT] = DrpaiData::new(LINUX_MEM_START, 0x1000);
    proc[DRPAI_INDEX_DRP_DESC] = DrpaiData::new(0x1000, 0x100);
    proc[DRPAI_INDEX_DRP_CFG] = DrpaiData::new(0x2000, 0x100);
    proc[DRPAI_INDEX_DRP_PARAM] = DrpaiData::new(0x3000, 0x100);
    proc[DRPAI_INDEX_AIMAC_DESC] = DrpaiData::new(0x4000, 0x100);
    proc[DRPAI_INDEX_WEIGHT] = DrpaiData::new(0x5000, 0x100);
    proc[DRPAI_INDEX_OUTPUT] = DrpaiData::new(0x6000, 0x100);
    proc
}

pub const ALL_LANES: OdifIntCount = OdifIntCount::new(1, 1, 1, 1);

/// Waker that counts how many times it was woken.
#[derive(Default)]
pub struct CountingWaker(pub AtomicUsize);

impl CountingWaker {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl Wake for CountingWaker {
    fn wake(self: Arc<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn counting_waker() -> (Arc<CountingWaker>, Waker) {
    let counter = Arc::new(CountingWaker::default());
    let waker = Waker::from(counter.clone());
    (counter, waker)
}

/// Records every completion code handed to a callback.
pub fn recording_callback() -> (Arc<Mutex<Vec<i32>>>, impl FnOnce(i32) + Send + 'static) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    (calls, move |code| sink.lock().unwrap().push(code))
}
