// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/task.rs - 解码任务
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
    mpsc,
  },
  thread,
  time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
  gate::{FrameGate, FrameGuard, RateLimiter},
  model::Model,
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Output = D;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始解码...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    let elapsed = now.elapsed();
    info!("解码完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("输出完成，耗时: {:.2?}", now.elapsed());

    Ok(result)
  }
}

/// 对同一帧重复解码，返回去掉预热后的平均耗时
pub struct RepeatShotTask {
  repeat: usize,
}

const REPEAT_WARMUP: usize = 2;

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 1000 }
  }
}

impl RepeatShotTask {
  pub fn new(repeat: usize) -> Self {
    Self {
      repeat: repeat.max(1),
    }
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Output = Duration;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始解码...");
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      debug!("({})解码完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &result)?;
      times.push(elapsed);
    }

    let skip = if times.len() > REPEAT_WARMUP {
      REPEAT_WARMUP
    } else {
      0
    };
    let counted = &times[skip..];
    let mean = counted.iter().sum::<Duration>() / counted.len() as u32;
    warn!("平均解码时间: {:.2?}", mean);

    Ok(mean)
  }
}

/// 连续任务的帧计数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
  /// 从输入收到的帧
  pub received: usize,
  /// 被限流器跳过的帧
  pub throttled: usize,
  /// 解码线程忙碌时丢弃的帧
  pub dropped: usize,
  /// 完成解码并输出的帧
  pub decoded: usize,
}

/// 连续处理输入帧：限流后交给单个解码线程，解码线程忙碌时新帧被丢弃
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  limiter: RateLimiter,
  handle_interrupt: bool,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
    self.limiter = limiter;
    self
  }

  /// 安装 Ctrl-C 处理函数；每个进程只能安装一次
  pub fn with_interrupt_handler(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }
}

fn install_interrupt_handler(stop: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    stop.store(true, Ordering::SeqCst);
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
}

impl<
  F: Send,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME> + Send,
  O: Render<F, D, Error = RE> + Send,
> Task<I, M, O> for ContinuousTask
{
  type Output = TaskReport;
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let stop = Arc::new(AtomicBool::new(false));
    if self.handle_interrupt {
      install_interrupt_handler(stop.clone())?;
    }

    let gate = FrameGate::new();
    let mut limiter = self.limiter;
    let mut report = TaskReport::default();
    // 闸门保证至多一帧在途，单槽通道不会阻塞发送端
    let (tx, rx) = mpsc::sync_channel::<(F, FrameGuard)>(1);

    thread::scope(|scope| {
      let worker = scope.spawn(move || -> anyhow::Result<usize> {
        let mut decoded = 0usize;
        for (frame, _guard) in rx {
          let now = Instant::now();
          let result = model.infer(&frame)?;
          let elapsed_a = now.elapsed();
          output.render_result(&frame, &result)?;
          decoded += 1;
          info!(
            "第 {} 帧解码完成，耗时: {:.2?} / {:.2?}",
            decoded,
            elapsed_a,
            now.elapsed()
          );
        }
        Ok(decoded)
      });

      for frame in input {
        if stop.load(Ordering::SeqCst) {
          warn!("中断信号接收，退出任务循环");
          break;
        }
        if self.frame_number.is_some_and(|n| report.received >= n) {
          info!("达到指定帧数 {}, 退出任务循环", report.received);
          break;
        }
        report.received += 1;

        if !limiter.admit() {
          report.throttled += 1;
          continue;
        }

        match gate.try_acquire() {
          Some(guard) => {
            if tx.send((frame, guard)).is_err() {
              warn!("解码线程已退出，停止读取输入");
              break;
            }
          }
          None => {
            report.dropped += 1;
            debug!("解码忙碌，丢弃第 {} 帧", report.received);
          }
        }
      }
      drop(tx);

      report.decoded = worker
        .join()
        .map_err(|_| anyhow::anyhow!("解码线程异常退出"))??;
      Ok::<(), anyhow::Error>(())
    })?;

    info!(
      "任务完成，收到 {} 帧, 限流 {} 帧, 丢弃 {} 帧, 解码 {} 帧",
      report.received, report.throttled, report.dropped, report.decoded
    );
    Ok(report)
  }
}
