// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/output/jsonl_output.rs - JSON Lines 结果记录
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
  fs::OpenOptions,
  io::{BufWriter, Write},
  sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
  },
};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectResult, DetectionRecord},
  output::Render,
};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("写入锁已中毒")]
  Poisoned,
}

#[derive(Serialize)]
pub(crate) struct FrameRecord<'a> {
  pub timestamp: String,
  pub frame: u64,
  pub detections: &'a [DetectionRecord],
}

impl<'a> FrameRecord<'a> {
  pub(crate) fn now(frame: u64, result: &'a DetectResult) -> Self {
    Self {
      timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
      frame,
      detections: &result.items,
    }
  }
}

/// `jsonl:///path/results.jsonl`，每帧追加一行
pub struct JsonLinesOutput {
  writer: Mutex<Box<dyn Write + Send>>,
  frame_counter: AtomicU64,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(JsonLinesOutputError::SchemeMismatch);
    }

    info!("结果写入: {}", url.path());
    let file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(url.path())?;
    Ok(Self::from_writer(BufWriter::new(file)))
  }
}

impl JsonLinesOutput {
  pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
    Self {
      writer: Mutex::new(Box::new(writer)),
      frame_counter: AtomicU64::new(0),
    }
  }
}

impl<F> Render<F, DetectResult> for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn render_result(&self, _frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    let frame = self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1;
    let record = FrameRecord::now(frame, result);
    let mut writer = self
      .writer
      .lock()
      .map_err(|_| JsonLinesOutputError::Poisoned)?;
    serde_json::to_writer(&mut *writer, &record)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
  }
}
