// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/bin/decode_oneshot.rs - 单帧解码
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use tracing::info;
use yanjing::{
  FromUrl,
  input::InputWrapper,
  label::LabelTable,
  model::DetectorBuilder,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};

/// Yanjing 单帧解码
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 解码参数，例如 detector:?threshold=0.5&max=10
  #[arg(long, value_name = "DETECTOR", default_value = "detector:")]
  pub detector: Url,
  /// 标签文件，例如 labels:///path/labels.txt
  #[arg(long, value_name = "LABELS")]
  pub labels: Option<Url>,
  /// 输入来源，tensor:// 或 tensors://
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，stdout:、jsonl:// 或 folder://
  #[arg(long, value_name = "OUTPUT", default_value = "stdout:")]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("解码参数: {}", args.detector);
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

  let result = OneShotTask.run_task(input, model, output)?;
  info!("共 {} 个检测结果", result.len());

  Ok(())
}
