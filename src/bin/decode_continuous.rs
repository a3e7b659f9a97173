// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/bin/decode_continuous.rs - 连续帧解码
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

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use url::Url;

use tracing::info;
use yanjing::{
  FromUrl,
  gate::RateLimiter,
  input::InputWrapper,
  label::LabelTable,
  model::DetectorBuilder,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};

/// Yanjing 连续帧解码
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 解码参数
  #[arg(long, value_name = "DETECTOR", default_value = "detector:")]
  pub detector: Url,
  /// 标签文件
  #[arg(long, value_name = "LABELS")]
  pub labels: Option<Url>,
  /// 输入来源，通常为 tensors:// 张量流
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "stdout:")]
  pub output: Url,
  /// 最大处理帧数（0 表示无限制）
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: usize,
  /// 每处理一帧后跳过的帧数
  #[arg(long, value_name = "COUNT", default_value_t = 0)]
  pub skip_frames: u32,
  /// 两次解码之间的最小间隔（毫秒）
  #[arg(long, value_name = "MILLIS", default_value_t = 0)]
  pub min_interval_ms: u64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let labels = match &args.labels {
    Some(url) => LabelTable::from_url(url)?,
    None => LabelTable::default(),
  };
  let mut input = InputWrapper::from_url(&args.input)?.peekable();
  let shape = match input.peek() {
    Some(tensor) => tensor.shape.clone(),
    None => anyhow::bail!("没有输入帧"),
  };
  let model = DetectorBuilder::from_url(&args.detector)?
    .labels(labels)
    .build(&shape)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let limiter = RateLimiter::new(args.skip_frames, Duration::from_millis(args.min_interval_ms));
  let task = ContinuousTask::default()
    .with_frame_number((args.frame_number > 0).then_some(args.frame_number))
    .with_rate_limiter(limiter)
    .with_interrupt_handler(true);

  let report = task.run_task(input, model, output)?;
  info!("{:?}", report);

  Ok(())
}
