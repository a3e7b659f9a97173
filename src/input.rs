// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/input.rs - 推理输出张量输入
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

use std::{fs::File, io::BufReader};

use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, tensor::RawOutputTensor};

mod tensor_file;
pub use self::tensor_file::TensorFileInput;

mod tensor_stream;
pub use self::tensor_stream::TensorStreamInput;

#[derive(Error, Debug)]
pub enum TensorInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("张量 JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 按 URI 方案选择输入
pub enum InputWrapper {
  TensorFile(TensorFileInput),
  TensorStream(TensorStreamInput<BufReader<File>>),
}

impl FromUrl for InputWrapper {
  type Error = TensorInputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      TensorFileInput::SCHEME => Ok(InputWrapper::TensorFile(TensorFileInput::from_url(url)?)),
      TensorStreamInput::<BufReader<File>>::SCHEME => Ok(InputWrapper::TensorStream(
        TensorStreamInput::from_url(url)?,
      )),
      _ => Err(TensorInputError::SchemeMismatch),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = RawOutputTensor;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::TensorFile(input) => input.next(),
      InputWrapper::TensorStream(input) => input.next(),
    }
  }
}
