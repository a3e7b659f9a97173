// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use chrono::{DateTime, Datelike, Utc};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::DetectResult,
  output::{Render, jsonl_output::FrameRecord},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("计数器锁已中毒")]
  Poisoned,
}

/// `folder:///path/to/dir[?always]`，每帧一个 JSON 文件，按日期分目录
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counters: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput::new(uri.path(), always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl AsRef<Path>, always: bool) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      frame_counters: Mutex::new(0),
      always,
    }
  }

  fn frame_id(&self) -> Result<u16, DirectoryRecordOutputError> {
    let mut counter = self
      .frame_counters
      .lock()
      .map_err(|_| DirectoryRecordOutputError::Poisoned)?;
    let id = counter.wrapping_add(1);
    *counter = id;
    Ok(id)
  }

  fn frame_path(&self, now: &DateTime<Utc>, id: u16) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.json",
      now.format("%H-%M-%S"),
      id
    )))
  }
}

impl<F> Render<F, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, _frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let id = self.frame_id()?;
    let path = self.frame_path(&Utc::now(), id)?;
    let record = FrameRecord::now(u64::from(id), result);
    let file = std::fs::File::create(&path)?;
    serde_json::to_writer_pretty(file, &record)?;
    debug!("检测结果已记录: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectionRecord;

  fn temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("yanjing-{}-{}", tag, std::process::id()))
  }

  fn count_json_files(dir: &Path) -> usize {
    let mut count = 0;
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        count += count_json_files(&path);
      } else if path.extension().is_some_and(|e| e == "json") {
        count += 1;
      }
    }
    count
  }

  #[test]
  fn skips_empty_results_unless_always() {
    let dir = temp_dir("record");
    let output = DirectoryRecordOutput::new(&dir, false);
    let hit: DetectResult = vec![DetectionRecord {
      center_x: 0.5,
      center_y: 0.5,
      width: 0.2,
      height: 0.2,
      confidence: 0.9,
      class_id: 0,
      label: "person".to_string(),
    }]
    .into();

    output.render_result(&(), &DetectResult::default()).unwrap();
    assert!(!dir.exists());
    output.render_result(&(), &hit).unwrap();
    assert_eq!(count_json_files(&dir), 1);

    std::fs::remove_dir_all(&dir).unwrap();

    let dir = temp_dir("record-always");
    let always = DirectoryRecordOutput::new(&dir, true);
    always.render_result(&(), &DetectResult::default()).unwrap();
    always.render_result(&(), &hit).unwrap();
    assert_eq!(count_json_files(&dir), 2);
    std::fs::remove_dir_all(&dir).unwrap();
  }
}
