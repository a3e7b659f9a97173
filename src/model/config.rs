// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/model/config.rs - 解码参数
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

const DEFAULT_MAX_RESULTS: usize = 10;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_BOX_SIZE_BOUNDS: (f32, f32) = (0.01, 1.0);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("最大结果数必须为正数")]
  ZeroMaxResults,
  #[error("扫描上限 {scan_limit} 小于最大结果数 {max_results}")]
  ScanLimitTooSmall { scan_limit: usize, max_results: usize },
  #[error("置信度阈值无效: {0}")]
  InvalidThreshold(f32),
  #[error("框尺寸范围无效: ({0}, {1})")]
  InvalidBoxBounds(f32, f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecoderConfig {
  /// 返回结果数量上限
  pub max_results: usize,
  /// 扫描期间接受的候选数量上限，达到后提前结束扫描
  pub scan_limit: usize,
  pub confidence_threshold: f32,
  /// 宽高须严格落在 (min, max) 内
  pub box_size_bounds: (f32, f32),
}

impl Default for DecoderConfig {
  fn default() -> Self {
    Self {
      max_results: DEFAULT_MAX_RESULTS,
      scan_limit: DEFAULT_MAX_RESULTS,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      box_size_bounds: DEFAULT_BOX_SIZE_BOUNDS,
    }
  }
}

impl DecoderConfig {
  /// 同时调整扫描上限，使两者保持一致
  pub fn with_max_results(mut self, max_results: usize) -> Self {
    self.max_results = max_results;
    self.scan_limit = max_results;
    self
  }

  pub fn with_scan_limit(mut self, scan_limit: usize) -> Self {
    self.scan_limit = scan_limit;
    self
  }

  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_box_size_bounds(mut self, min: f32, max: f32) -> Self {
    self.box_size_bounds = (min, max);
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_results == 0 {
      return Err(ConfigError::ZeroMaxResults);
    }
    if self.scan_limit < self.max_results {
      return Err(ConfigError::ScanLimitTooSmall {
        scan_limit: self.scan_limit,
        max_results: self.max_results,
      });
    }
    if !self.confidence_threshold.is_finite() {
      return Err(ConfigError::InvalidThreshold(self.confidence_threshold));
    }
    let (min, max) = self.box_size_bounds;
    if !(min.is_finite() && max.is_finite()) || min >= max {
      return Err(ConfigError::InvalidBoxBounds(min, max));
    }
    Ok(())
  }

  #[inline]
  pub(crate) fn box_size_ok(&self, size: f32) -> bool {
    let (min, max) = self.box_size_bounds;
    size > min && size < max
  }
}
