// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/output.rs - 输出定义
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

use std::convert::Infallible;

use crate::model::DetectResult;
use crate::{FromUrl, FromUrlWithScheme};
use thiserror::Error;
use url::Url;

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

mod log_output;
pub use self::log_output::LogOutput;

mod jsonl_output;
pub use self::jsonl_output::{JsonLinesOutput, JsonLinesOutputError};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON Lines 输出错误: {0}")]
  JsonLinesOutputError(#[from] JsonLinesOutputError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

impl From<Infallible> for OutputError {
  fn from(never: Infallible) -> Self {
    match never {}
  }
}

pub enum OutputWrapper {
  Log(LogOutput),
  JsonLines(JsonLinesOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      JsonLinesOutput::SCHEME => Ok(OutputWrapper::JsonLines(JsonLinesOutput::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecord(
        DirectoryRecordOutput::from_url(url)?,
      )),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl<F> Render<F, DetectResult> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      OutputWrapper::JsonLines(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}
