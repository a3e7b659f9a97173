// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/gate.rs - 帧节流与单帧在途保护
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

/// 保证同一时刻至多一个解码在进行；忙碌时到达的帧直接丢弃，不排队
#[derive(Debug, Clone, Default)]
pub struct FrameGate {
  busy: Arc<AtomicBool>,
}

/// 持有期间闸门处于忙碌状态，释放时自动打开
#[derive(Debug)]
pub struct FrameGuard {
  busy: Arc<AtomicBool>,
}

impl FrameGate {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn try_acquire(&self) -> Option<FrameGuard> {
    self
      .busy
      .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
      .ok()
      .map(|_| FrameGuard {
        busy: self.busy.clone(),
      })
  }

  pub fn is_busy(&self) -> bool {
    self.busy.load(Ordering::Acquire)
  }
}

impl Drop for FrameGuard {
  fn drop(&mut self) {
    self.busy.store(false, Ordering::Release);
  }
}

/// 帧来源一侧的节流策略：每 `skip_frames + 1` 帧取一帧，且两次放行间隔不少于 `min_interval`
#[derive(Debug, Clone)]
pub struct RateLimiter {
  skip_frames: u32,
  min_interval: Duration,
  seen: u64,
  last_admitted: Option<Instant>,
}

impl Default for RateLimiter {
  fn default() -> Self {
    Self::new(0, Duration::ZERO)
  }
}

impl RateLimiter {
  pub fn new(skip_frames: u32, min_interval: Duration) -> Self {
    Self {
      skip_frames,
      min_interval,
      seen: 0,
      last_admitted: None,
    }
  }

  pub fn admit(&mut self) -> bool {
    self.admit_at(Instant::now())
  }

  pub fn admit_at(&mut self, now: Instant) -> bool {
    let index = self.seen;
    self.seen += 1;

    if index % (self.skip_frames as u64 + 1) != 0 {
      return false;
    }

    let too_soon = self
      .last_admitted
      .is_some_and(|last| now.saturating_duration_since(last) < self.min_interval);
    if too_soon {
      return false;
    }

    self.last_admitted = Some(now);
    true
  }
}
