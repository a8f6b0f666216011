//! 字符设备驱动

pub mod drpai;
