// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/preprocess.rs - 相机帧预处理：YUV420 转 RGB 与最近邻缩放
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

use image::{
  Rgb, RgbImage,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::debug;

use crate::frame::{FrameError, RgbNhwcFrame};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("帧尺寸为空: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
  #[error("{plane} 平面数据不足: 需要 {required} 字节, 实际 {actual} 字节")]
  PlaneTooShort {
    plane: &'static str,
    required: usize,
    actual: usize,
  },
  #[error("帧错误: {0}")]
  Frame(#[from] FrameError),
}

/// 相机给出的单个平面
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
  pub data: &'a [u8],
  pub row_stride: usize,
  pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
  pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
    Self {
      data,
      row_stride,
      pixel_stride,
    }
  }

  fn check(&self, name: &'static str, width: u32, height: u32) -> Result<(), PreprocessError> {
    let required = (height as usize - 1) * self.row_stride
      + (width as usize - 1) * self.pixel_stride
      + 1;
    if self.data.len() < required {
      return Err(PreprocessError::PlaneTooShort {
        plane: name,
        required,
        actual: self.data.len(),
      });
    }
    Ok(())
  }

  #[inline]
  fn at(&self, x: u32, y: u32) -> u8 {
    self.data[y as usize * self.row_stride + x as usize * self.pixel_stride]
  }
}

/// YUV 4:2:0 帧；平面 I420（像素步长 1）与半平面 NV12/NV21（像素步长 2）都可以表示
#[derive(Debug, Clone, Copy)]
pub struct YuvFrame<'a> {
  pub width: u32,
  pub height: u32,
  pub y: Plane<'a>,
  pub u: Plane<'a>,
  pub v: Plane<'a>,
}

fn clamp_u8(v: f32) -> u8 {
  v.round().clamp(0.0, 255.0) as u8
}

/// BT.601 全范围 YUV 转 RGB
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
  let y = y as f32;
  let u = u as f32 - 128.0;
  let v = v as f32 - 128.0;
  [
    clamp_u8(y + 1.402 * v),
    clamp_u8(y - 0.344_136 * u - 0.714_136 * v),
    clamp_u8(y + 1.772 * u),
  ]
}

pub fn yuv420_to_rgb(frame: &YuvFrame<'_>) -> Result<RgbImage, PreprocessError> {
  let (width, height) = (frame.width, frame.height);
  if width == 0 || height == 0 {
    return Err(PreprocessError::EmptyFrame { width, height });
  }

  let (chroma_w, chroma_h) = (width.div_ceil(2), height.div_ceil(2));
  frame.y.check("Y", width, height)?;
  frame.u.check("U", chroma_w, chroma_h)?;
  frame.v.check("V", chroma_w, chroma_h)?;

  Ok(RgbImage::from_fn(width, height, |col, row| {
    Rgb(yuv_to_rgb(
      frame.y.at(col, row),
      frame.u.at(col / 2, row / 2),
      frame.v.at(col / 2, row / 2),
    ))
  }))
}

/// 最近邻缩放到模型输入尺寸
pub fn resize_nearest<const W: u32, const H: u32>(
  src: &RgbImage,
) -> Result<RgbNhwcFrame<W, H>, PreprocessError> {
  if src.width() == 0 || src.height() == 0 {
    return Err(PreprocessError::EmptyFrame {
      width: src.width(),
      height: src.height(),
    });
  }

  let resized = imageops::resize(src, W, H, FilterType::Nearest);
  Ok(RgbNhwcFrame::try_from(resized.into_raw())?)
}

/// 相机帧到模型输入张量的完整预处理
pub fn yuv420_to_input_tensor<const W: u32, const H: u32>(
  frame: &YuvFrame<'_>,
) -> Result<Vec<f32>, PreprocessError> {
  let rgb = yuv420_to_rgb(frame)?;
  let resized = resize_nearest::<W, H>(&rgb)?;
  debug!(
    "预处理完成: {}x{} -> {}x{}",
    frame.width, frame.height, W, H
  );
  Ok(resized.to_input_tensor())
}
