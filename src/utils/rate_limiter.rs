// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// 令牌桶限流器
///
/// 进程内按提供商限制外部 API 的请求速率（如翻译服务的 RPS）。
/// 桶容量为 1 个突发令牌，令牌按固定速率补充
#[derive(Debug)]
pub struct TokenBucket {
    interval: Option<Duration>,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    next_at: Instant,
}

impl TokenBucket {
    /// 创建新的令牌桶限流器
    ///
    /// # 参数
    ///
    /// * `rps` - 每秒允许的请求数；小于等于 0 时不限流
    pub fn new(rps: f64) -> Self {
        let interval = if rps > 0.0 {
            Some(Duration::from_secs_f64(1.0 / rps))
        } else {
            None
        };

        Self {
            interval,
            state: Mutex::new(BucketState {
                next_at: Instant::now(),
            }),
        }
    }

    /// 获取一个令牌，必要时等待
    pub async fn acquire(&self) {
        let Some(interval) = self.interval else {
            return;
        };

        let wait_until = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let at = if state.next_at > now { state.next_at } else { now };
            state.next_at = at + interval;
            at
        };

        tokio::time::sleep_until(wait_until).await;
    }
}
