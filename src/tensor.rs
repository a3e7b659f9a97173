// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/tensor.rs - 推理输出张量与内存布局
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 每个候选框至少包含 x, y, w, h 和一个分数
pub const MIN_VALUE_COUNT: usize = 5;

/// 形状无法解析时采用的默认候选数量
pub const FALLBACK_DETECTION_COUNT: usize = 8400;
/// 形状无法解析时采用的默认每候选值数量
pub const FALLBACK_VALUE_COUNT: usize = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
  #[error("张量维度数量无效: {0}（期望 3 或 4 维）")]
  InvalidRank(usize),
  #[error("张量第 {index} 维为 0")]
  ZeroDimension { index: usize },
  #[error("每个候选的值数量过少: {0}（至少需要 5）")]
  TooFewValues(usize),
}

/// 推理引擎给出的原始输出：扁平的 f32 缓冲区加上形状描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOutputTensor {
  pub shape: Box<[usize]>,
  pub data: Box<[f32]>,
}

impl RawOutputTensor {
  pub fn new(shape: impl Into<Box<[usize]>>, data: impl Into<Box<[f32]>>) -> Self {
    Self {
      shape: shape.into(),
      data: data.into(),
    }
  }

  pub fn layout(&self) -> Result<TensorLayout, ShapeError> {
    infer_layout(&self.shape)
  }

  /// 形状所描述的元素总数（与实际缓冲区长度可能不同）
  pub fn declared_len(&self) -> usize {
    self.shape.iter().product()
  }
}

/// 输出张量的两种内存布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
  /// 所有候选的 x 连续存放，然后是所有 y，依此类推（步长 = 候选数量）
  ChannelMajor {
    value_count: usize,
    detection_count: usize,
  },
  /// 每个候选的所有值连续存放（步长 = 值数量）
  DetectionMajor {
    detection_count: usize,
    value_count: usize,
  },
}

impl Default for TensorLayout {
  fn default() -> Self {
    TensorLayout::ChannelMajor {
      value_count: FALLBACK_VALUE_COUNT,
      detection_count: FALLBACK_DETECTION_COUNT,
    }
  }
}

impl TensorLayout {
  pub fn value_count(&self) -> usize {
    match *self {
      TensorLayout::ChannelMajor { value_count, .. } => value_count,
      TensorLayout::DetectionMajor { value_count, .. } => value_count,
    }
  }

  pub fn detection_count(&self) -> usize {
    match *self {
      TensorLayout::ChannelMajor {
        detection_count, ..
      } => detection_count,
      TensorLayout::DetectionMajor {
        detection_count, ..
      } => detection_count,
    }
  }

  /// 第 `detection` 个候选的第 `value` 个值在扁平缓冲区中的下标，溢出时为 `None`
  #[inline]
  pub fn index(&self, detection: usize, value: usize) -> Option<usize> {
    match *self {
      TensorLayout::ChannelMajor {
        detection_count, ..
      } => value.checked_mul(detection_count)?.checked_add(detection),
      TensorLayout::DetectionMajor { value_count, .. } => {
        detection.checked_mul(value_count)?.checked_add(value)
      }
    }
  }

  /// 长度为 `len` 的缓冲区能完整容纳的候选数量，不超过 `detection_count`
  pub fn readable_detections(&self, len: usize) -> usize {
    match *self {
      TensorLayout::ChannelMajor {
        value_count,
        detection_count,
      } => match value_count.saturating_sub(1).checked_mul(detection_count) {
        Some(offset) => len.saturating_sub(offset).min(detection_count),
        None => 0,
      },
      TensorLayout::DetectionMajor {
        detection_count,
        value_count,
      } => len.checked_div(value_count).unwrap_or(0).min(detection_count),
    }
  }
}

/// 根据形状推断布局：两个末尾维度中较大者为候选数量，较小者为值数量。
///
/// 接受 `[1, A, B]` 或 `[1, 1, A, B]`。两者相等时按通道优先处理。
pub fn infer_layout(shape: &[usize]) -> Result<TensorLayout, ShapeError> {
  if !(3..=4).contains(&shape.len()) {
    return Err(ShapeError::InvalidRank(shape.len()));
  }
  if let Some(index) = shape.iter().position(|&d| d == 0) {
    return Err(ShapeError::ZeroDimension { index });
  }

  let a = shape[shape.len() - 2];
  let b = shape[shape.len() - 1];

  let layout = if a <= b {
    TensorLayout::ChannelMajor {
      value_count: a,
      detection_count: b,
    }
  } else {
    TensorLayout::DetectionMajor {
      detection_count: a,
      value_count: b,
    }
  };

  if layout.value_count() < MIN_VALUE_COUNT {
    return Err(ShapeError::TooFewValues(layout.value_count()));
  }

  Ok(layout)
}
