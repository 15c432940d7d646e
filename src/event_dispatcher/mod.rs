use tracing::info;

use crate::event_model::PostEvent;

/// 处理后事件的出口
///
/// seat、合成器或者测试都通过实现这个 trait 接收事件
pub trait EventSink {
    fn post(&mut self, event: PostEvent);
}

impl EventSink for Vec<PostEvent> {
    fn post(&mut self, event: PostEvent) {
        self.push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn post(&mut self, event: PostEvent) {
        (**self).post(event);
    }
}

/// 把事件写进日志，命令行工具使用
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn post(&mut self, event: PostEvent) {
        info!(time = event.time, "{:?}", event.kind);
    }
}
