// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 模型输入尺寸的 RGB 帧，按 NHWC（行优先、通道交错）存放
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> TryFrom<Vec<u8>> for RgbNhwcFrame<W, H> {
  type Error = FrameError;

  fn try_from(data: Vec<u8>) -> Result<Self, Self::Error> {
    let expected = RGB_CHANNELS * W as usize * H as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const W: u32, const H: u32> Default for RgbNhwcFrame<W, H> {
  fn default() -> Self {
    let size = RGB_CHANNELS * (W as usize) * (H as usize);
    let data = vec![0u8; size].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
    let offset = (y * self.width() + x) * RGB_CHANNELS;
    [
      self.data[offset],
      self.data[offset + 1],
      self.data[offset + 2],
    ]
  }

  /// 归一化到 [0, 1] 的扁平 f32 输入张量，形状 [1, H, W, 3]
  pub fn to_input_tensor(&self) -> Vec<f32> {
    self.data.iter().map(|&v| v as f32 / 255.0).collect()
  }
}

impl<const W: u32, const H: u32> AsRef<[u8]> for RgbNhwcFrame<W, H> {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}
