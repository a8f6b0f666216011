//! 设备节点实现

pub mod dev;
