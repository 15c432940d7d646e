/// 限流判断结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitState {
    Pass,
    /// 本窗口内最后一条允许的消息
    Threshold,
    Exceeded,
}

/// 以事件时间为基准的日志限流器，`burst` 条消息每 `interval` 微秒
#[derive(Debug, Clone)]
pub struct RateLimit {
    interval: u64,
    burst: u32,
    begin: u64,
    count: u32,
}

impl RateLimit {
    pub fn new(interval: u64, burst: u32) -> Self {
        Self {
            interval,
            burst,
            begin: 0,
            count: 0,
        }
    }

    pub fn test(&mut self, now: u64) -> RateLimitState {
        if self.interval == 0 || self.burst == 0 {
            return RateLimitState::Pass;
        }

        if self.count == 0 || now.saturating_sub(self.begin) >= self.interval {
            self.begin = now;
            self.count = 1;
            return RateLimitState::Pass;
        }

        self.count = self.count.saturating_add(1);
        match self.count.cmp(&self.burst) {
            std::cmp::Ordering::Less => RateLimitState::Pass,
            std::cmp::Ordering::Equal => RateLimitState::Threshold,
            std::cmp::Ordering::Greater => RateLimitState::Exceeded,
        }
    }
}

impl Default for RateLimit {
    /// 每 10 秒 10 条
    fn default() -> Self {
        Self::new(10_000_000, 10)
    }
}

/// 限流后的 `warn!`，超过阈值时额外提示一次
#[macro_export]
macro_rules! warn_ratelimit {
    ($limit:expr, $now:expr, $($arg:tt)+) => {
        match $limit.test($now) {
            $crate::ratelimit::RateLimitState::Pass => {
                tracing::warn!($($arg)+);
            }
            $crate::ratelimit::RateLimitState::Threshold => {
                tracing::warn!($($arg)+);
                tracing::warn!("WARNING: log rate limit exceeded, discarding messages");
            }
            $crate::ratelimit::RateLimitState::Exceeded => {}
        }
    };
}
