/// 设备能力和每设备配置
pub mod caps;

/// 设备坐标、归一化坐标和各种矩形
pub mod geometry;

/// 日志限流
pub mod ratelimit;

/// 原始事件和处理后事件的模型
pub mod event_model;

/// 处理后事件的出口
pub mod event_dispatcher;

/// 鼠标、键盘、触摸屏和开关的事件处理
pub mod fallback;

/// seat 范围的触摸槽位和设备联动
pub mod seat;

/// evdev 设备节点的读取
pub mod input_devices;

// 事件流向：`input_devices` 读出原始事件 -> `seat` 按设备分发 -> `fallback` 在每个
// `SYN_REPORT` 时 flush -> `seat` 处理设备之间的联动 -> `event_dispatcher`
//
// `fallback` 本身不碰文件也不碰时钟，时间全部由调用方传入，测试里可以直接喂事件
