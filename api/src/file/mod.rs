pub mod drpai;

use alloc::borrow::Cow;

use axerrno::{AxError, AxResult};
use axpoll::Pollable;
use downcast_rs::{DowncastSync, impl_downcast};

#[allow(dead_code)]
pub trait FileLike: Pollable + DowncastSync {
    fn read(&self, _buf: &mut [u8]) -> AxResult<usize> {
        Err(AxError::InvalidInput)
    }

    fn write(&self, _buf: &[u8]) -> AxResult<usize> {
        Err(AxError::InvalidInput)
    }

    fn path(&self) -> Cow<'_, str>;

    fn ioctl(&self, _cmd: u32, _arg: usize) -> AxResult<usize> {
        Err(AxError::NotATty)
    }
}
impl_downcast!(sync FileLike);
