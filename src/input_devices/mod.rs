/// evdev 设备节点的读取、能力探测和写回
pub mod evdev_source;

pub use evdev_source::{EvdevSource, write_events};

use std::thread::JoinHandle;
use std::time::Instant;

use tokio::sync::mpsc::UnboundedSender;
use tracing::error;

use crate::event_model::RawEvent;
use crate::seat::DeviceId;

#[derive(Debug, Clone, Copy)]
pub enum ReaderMessage {
    Event(DeviceId, RawEvent),
    /// 设备读取出错（一般是被拔掉了）
    Closed(DeviceId),
}

/// 在单独的线程里阻塞读取设备，接收端关闭或读取出错时退出
pub fn spawn_reader(
    id: DeviceId,
    mut source: EvdevSource,
    epoch: Instant,
    tx: UnboundedSender<ReaderMessage>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            match source.next_event(epoch) {
                Ok(event) => {
                    if tx.send(ReaderMessage::Event(id, event)).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    error!(path = %source.path().display(), "reader stopped: {err:#}");
                    let _ = tx.send(ReaderMessage::Closed(id));
                    return;
                }
            }
        }
    })
}
