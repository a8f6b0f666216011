//! DRP-AI 中断处理
//!
//! 四个中断源各自在 `status_lock` 内更新状态。完成回调在锁内取出、锁外调用，
//! 等待者的唤醒同样放在锁外。

use super::{
    DRPAI_CHANNEL,
    kernel::CompletionToken,
    session::DrpaiSession,
    types::{DrpaiErrInfo, DrpaiStatusCode},
};

/// 中断源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrpaiIrq {
    /// DRP 正常中断
    DrpNormal,
    /// DRP 错误中断
    DrpError,
    /// AI-MAC 正常中断
    AimacNormal,
    /// AI-MAC 错误中断
    AimacError,
}

impl DrpaiSession {
    /// 分发中断
    pub fn handle_irq(&self, irq: DrpaiIrq) {
        match irq {
            DrpaiIrq::DrpNormal => self.irq_drp_nmlint(),
            DrpaiIrq::DrpError => self.irq_drp_errint(),
            DrpaiIrq::AimacNormal => self.irq_mac_nmlint(),
            DrpaiIrq::AimacError => self.irq_mac_errint(),
        }
    }

    /// DRP 正常中断
    ///
    /// 累加四路 ODIF 计数，全部到达后回到 IDLE 并通知回调。
    /// 不唤醒轮询者，轮询路径由随后的 AI-MAC 正常中断唤醒。
    fn irq_drp_nmlint(&self) {
        let callback = {
            let mut st = self.state.lock();
            let local = self.hal.drp_nmlint(DRPAI_CHANNEL);
            st.lanes.accumulate(&local);
            trace!("[DRPAI] ODIF count {:?} (+{:?})", st.lanes, local);

            if st.lanes.all_done() {
                st.set_status(DrpaiStatusCode::Idle);
                st.callback.take()
            } else {
                None
            }
        };
        if let Some(token) = callback {
            token.complete(CompletionToken::SUCCESS);
        }
    }

    /// DRP 错误中断
    ///
    /// 有回调时只通知回调，否则唤醒轮询者。
    fn irq_drp_errint(&self) {
        let callback = {
            let mut st = self.state.lock();
            self.hal.drp_errint(DRPAI_CHANNEL);
            st.set_err(DrpaiErrInfo::DrpErr);
            st.set_status(DrpaiStatusCode::Idle);
            st.ready = true;
            st.callback.take()
        };
        error!("[DRPAI] DRP error interrupt");
        match callback {
            Some(token) => token.complete(CompletionToken::HW_ERROR),
            None => {
                self.poll_set.wake();
            }
        }
    }

    /// AI-MAC 正常中断，非回调路径的主要完成信号
    fn irq_mac_nmlint(&self) {
        {
            let mut st = self.state.lock();
            self.hal.aimac_nmlint(DRPAI_CHANNEL);
            st.set_status(DrpaiStatusCode::Idle);
            st.ready = true;
        }
        self.poll_set.wake();
    }

    /// AI-MAC 错误中断
    fn irq_mac_errint(&self) {
        {
            let mut st = self.state.lock();
            self.hal.aimac_errint(DRPAI_CHANNEL);
            st.set_err(DrpaiErrInfo::AimacErr);
            st.set_status(DrpaiStatusCode::Idle);
            st.ready = true;
        }
        error!("[DRPAI] AI-MAC error interrupt");
        self.poll_set.wake();
    }
}
