// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 一次解码得到的单个检测结果，坐标均为相对图像的归一化值
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
  pub center_x: f32,
  pub center_y: f32,
  pub width: f32,
  pub height: f32,
  pub confidence: f32,
  pub class_id: usize,
  pub label: String,
}

impl DetectionRecord {
  /// [x_min, y_min, x_max, y_max]
  pub fn bbox(&self) -> [f32; 4] {
    let half_w = self.width / 2.0;
    let half_h = self.height / 2.0;
    [
      self.center_x - half_w,
      self.center_y - half_h,
      self.center_x + half_w,
      self.center_y + half_h,
    ]
  }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectResult {
  pub items: Box<[DetectionRecord]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectionRecord> {
    self.items.iter()
  }
}

impl From<Vec<DetectionRecord>> for DetectResult {
  fn from(items: Vec<DetectionRecord>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

mod config;
mod decoder;
mod detector;

pub use self::config::{ConfigError, DecoderConfig};
pub use self::decoder::{
  DecodeError, DecodeStats, Decoded, GENERIC_LABEL, decode, decode_with_layout,
  layout_or_fallback, sigmoid,
};
pub use self::detector::{Detector, DetectorBuilder, DetectorBuilderError};
