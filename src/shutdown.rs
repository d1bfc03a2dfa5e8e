//! 优雅关闭
//!
//! 两条通道分工：broadcast负责广播停止信号，mpsc哨兵负责回收确认。
//! 每个长生命周期组件持有一个`ShutdownSignal`，组件退出时哨兵随之
//! 释放；协调器等到所有哨兵释放（在途的调度tick跑完、HTTP请求排空）
//! 才放行进程退出，超过宽限期则不再等待。

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

pub struct ShutdownCoordinator {
    notify: broadcast::Sender<()>,
    drain_tx: mpsc::Sender<()>,
    drain_rx: mpsc::Receiver<()>,
}

/// 组件侧的关闭句柄
pub struct ShutdownSignal {
    received: bool,
    notify: broadcast::Receiver<()>,
    _drain: mpsc::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        let (drain_tx, drain_rx) = mpsc::channel(1);
        Self {
            notify,
            drain_tx,
            drain_rx,
        }
    }

    /// 发一个关闭句柄给组件，句柄存活期间进程不会退出
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            received: false,
            notify: self.notify.subscribe(),
            _drain: self.drain_tx.clone(),
        }
    }

    /// 广播停止并等待所有组件退出；超过宽限期则放弃等待
    pub async fn shutdown(mut self, grace: Duration) {
        let _ = self.notify.send(());
        // 释放协调器自己的哨兵，否则recv永远不返回None
        drop(self.drain_tx);

        match tokio::time::timeout(grace, self.drain_rx.recv()).await {
            Ok(_) => info!("所有组件已退出"),
            Err(_) => warn!(
                grace_secs = grace.as_secs(),
                "宽限期内仍有组件未退出，强制关闭"
            ),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// 等待关闭信号；收到过一次后立即返回
    pub async fn recv(&mut self) {
        if self.received {
            return;
        }
        let _ = self.notify.recv().await;
        self.received = true;
    }

    /// 派生一个句柄给同一应用内的另一个组件
    pub fn branch(&self) -> ShutdownSignal {
        ShutdownSignal {
            received: self.received,
            notify: self.notify.resubscribe(),
            _drain: self._drain.clone(),
        }
    }
}
