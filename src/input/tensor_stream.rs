// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/input/tensor_stream.rs - 逐行张量流输入
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
  fs::File,
  io::{BufRead, BufReader},
};

use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::TensorInputError, tensor::RawOutputTensor};

/// `tensors:///path/frames.jsonl`，每行一个张量，按帧顺序回放
pub struct TensorStreamInput<R> {
  reader: R,
  line: usize,
}

impl FromUrlWithScheme for TensorStreamInput<BufReader<File>> {
  const SCHEME: &'static str = "tensors";
}

impl FromUrl for TensorStreamInput<BufReader<File>> {
  type Error = TensorInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorInputError::SchemeMismatch);
    }

    info!("打开张量流: {}", url.path());
    let file = File::open(url.path())?;
    Ok(Self::from_reader(BufReader::new(file)))
  }
}

impl<R: BufRead> TensorStreamInput<R> {
  pub fn from_reader(reader: R) -> Self {
    Self { reader, line: 0 }
  }
}

impl<R: BufRead> Iterator for TensorStreamInput<R> {
  type Item = RawOutputTensor;

  fn next(&mut self) -> Option<Self::Item> {
    let mut buf = String::new();
    loop {
      buf.clear();
      self.line += 1;
      match self.reader.read_line(&mut buf) {
        Ok(0) => return None,
        Ok(_) => {}
        Err(e) => {
          error!("读取第 {} 行失败: {}", self.line, e);
          return None;
        }
      }

      let text = buf.trim();
      if text.is_empty() {
        continue;
      }
      match serde_json::from_str(text) {
        Ok(tensor) => return Some(tensor),
        Err(e) => warn!("跳过第 {} 行: {}", self.line, e),
      }
    }
  }
}
