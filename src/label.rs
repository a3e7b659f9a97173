// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/label.rs - 类别标签表
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

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("读取标签文件失败: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按类别序号排列的标签表，加载后只读
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
  labels: Arc<[String]>,
}

impl LabelTable {
  /// 每行一个标签；空行与 `#` 开头的行被忽略
  pub fn parse(text: &str) -> Self {
    let labels: Vec<String> = text
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty() && !line.starts_with('#'))
      .map(str::to_string)
      .collect();
    debug!("解析得到 {} 个标签", labels.len());
    Self {
      labels: labels.into(),
    }
  }

  pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Ok(Self::parse(&text))
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.labels.get(class_id).map(String::as_str)
  }

  /// 超出表长的序号得到 `Class N`
  pub fn resolve(&self, class_id: usize) -> String {
    match self.get(class_id) {
      Some(label) => label.to_string(),
      None => format!("Class {}", class_id),
    }
  }
}

impl<S: Into<String>> FromIterator<S> for LabelTable {
  fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
    let labels: Vec<String> = iter.into_iter().map(Into::into).collect();
    Self {
      labels: labels.into(),
    }
  }
}

impl FromUrlWithScheme for LabelTable {
  const SCHEME: &'static str = "labels";
}

impl FromUrl for LabelTable {
  type Error = LabelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(LabelError::SchemeMismatch);
    }
    Self::from_path(url.path())
  }
}
