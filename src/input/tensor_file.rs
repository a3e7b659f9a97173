// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/input/tensor_file.rs - 单个张量文件输入
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

use std::io::Read;

use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::TensorInputError, tensor::RawOutputTensor};

/// `tensor:///path/output.json`，内容为 `{"shape": [...], "data": [...]}`
pub struct TensorFileInput {
  tensor: Option<RawOutputTensor>,
}

impl FromUrlWithScheme for TensorFileInput {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for TensorFileInput {
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

    info!("读取张量文件: {}", url.path());
    let file = std::fs::File::open(url.path())?;
    Self::from_reader(file)
  }
}

impl TensorFileInput {
  pub fn from_reader<R: Read>(reader: R) -> Result<Self, TensorInputError> {
    let tensor: RawOutputTensor = serde_json::from_reader(reader)?;
    debug!(
      "张量形状 {:?}, 数据长度 {}",
      tensor.shape,
      tensor.data.len()
    );
    Ok(Self {
      tensor: Some(tensor),
    })
  }
}

impl Iterator for TensorFileInput {
  type Item = RawOutputTensor;

  fn next(&mut self) -> Option<Self::Item> {
    self.tensor.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yields_single_tensor() {
    let json = r#"{"shape": [1, 5, 2], "data": [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]}"#;
    let mut input = TensorFileInput::from_reader(json.as_bytes()).unwrap();
    let tensor = input.next().unwrap();
    assert_eq!(&*tensor.shape, &[1, 5, 2]);
    assert_eq!(tensor.data.len(), 10);
    assert!(input.next().is_none());
  }

  #[test]
  fn malformed_json_is_an_error() {
    let err = TensorFileInput::from_reader(&b"{\"shape\": [1, 5"[..]);
    assert!(matches!(err, Err(TensorInputError::JsonError(_))));
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("labels:///tmp/output.json").unwrap();
    assert!(matches!(
      TensorFileInput::from_url(&url),
      Err(TensorInputError::SchemeMismatch)
    ));
  }
}
