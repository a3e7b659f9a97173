// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/model/detector.rs - 绑定布局与标签的检测解码器
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

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  label::LabelTable,
  model::{ConfigError, DecoderConfig, DetectResult, Model, decode_with_layout, layout_or_fallback},
  tensor::{RawOutputTensor, TensorLayout},
};

#[derive(Error, Debug)]
pub enum DetectorBuilderError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("参数 {key} 的值无效: {value}")]
  InvalidParameter { key: String, value: String },
  #[error("解码参数无效: {0}")]
  Config(#[from] ConfigError),
}

/// 模型加载时确定一次布局，之后每帧复用
#[derive(Debug, Clone)]
pub struct Detector {
  layout: TensorLayout,
  labels: LabelTable,
  config: DecoderConfig,
}

impl Detector {
  pub fn layout(&self) -> TensorLayout {
    self.layout
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn config(&self) -> &DecoderConfig {
    &self.config
  }
}

impl Model for Detector {
  type Input = RawOutputTensor;
  type Output = DetectResult;
  type Error = Infallible;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    if input.declared_len() != self.layout.value_count() * self.layout.detection_count() {
      debug!(
        "输入形状 {:?} 与加载时的布局 {:?} 不一致，仍按加载时布局解码",
        input.shape, self.layout
      );
    }

    let decoded = decode_with_layout(&input.data, self.layout, &self.labels, &self.config);
    debug!("检测到 {} 个物体", decoded.records.len());
    Ok(decoded.records.into())
  }
}

/// 通过 `detector:?threshold=0.5&max=10&scan=10&min_box=0.01&max_box=1.0` 配置
#[derive(Debug, Clone, Default)]
pub struct DetectorBuilder {
  config: DecoderConfig,
  labels: LabelTable,
}

impl FromUrlWithScheme for DetectorBuilder {
  const SCHEME: &'static str = "detector";
}

impl FromUrl for DetectorBuilder {
  type Error = DetectorBuilderError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DetectorBuilderError::SchemeMismatch);
    }

    let mut config = DecoderConfig::default();
    let mut scan_limit = None;
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "threshold" => config.confidence_threshold = parse_param(&key, &value)?,
        "max" => config = config.with_max_results(parse_param(&key, &value)?),
        "scan" => scan_limit = Some(parse_param(&key, &value)?),
        "min_box" => config.box_size_bounds.0 = parse_param(&key, &value)?,
        "max_box" => config.box_size_bounds.1 = parse_param(&key, &value)?,
        _ => warn!("忽略未知参数: {}={}", key, value),
      }
    }
    if let Some(scan_limit) = scan_limit {
      config = config.with_scan_limit(scan_limit);
    }

    Ok(Self {
      config,
      labels: LabelTable::default(),
    })
  }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DetectorBuilderError> {
  value
    .parse()
    .map_err(|_| DetectorBuilderError::InvalidParameter {
      key: key.to_string(),
      value: value.to_string(),
    })
}

impl DetectorBuilder {
  pub fn config(mut self, config: DecoderConfig) -> Self {
    self.config = config;
    self
  }

  pub fn labels(mut self, labels: LabelTable) -> Self {
    self.labels = labels;
    self
  }

  /// `output_shape` 应当取自已加载模型声明的输出形状
  pub fn build(self, output_shape: &[usize]) -> Result<Detector, DetectorBuilderError> {
    self.config.validate()?;
    let layout = layout_or_fallback(output_shape);
    info!(
      "解码器就绪: 布局 {:?}, 标签 {} 个, 参数 {:?}",
      layout,
      self.labels.len(),
      self.config
    );
    Ok(Detector {
      layout,
      labels: self.labels,
      config: self.config,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_reads_query_parameters() {
    let url = Url::parse("detector:?threshold=0.3&max=5&scan=20&min_box=0.02&max_box=0.9").unwrap();
    let builder = DetectorBuilder::from_url(&url).unwrap();
    let detector = builder.build(&[1, 5, 8400]).unwrap();
    let config = detector.config();
    assert_eq!(config.confidence_threshold, 0.3);
    assert_eq!(config.max_results, 5);
    assert_eq!(config.scan_limit, 20);
    assert_eq!(config.box_size_bounds, (0.02, 0.9));
  }

  #[test]
  fn builder_rejects_bad_values() {
    let url = Url::parse("detector:?max=many").unwrap();
    assert!(matches!(
      DetectorBuilder::from_url(&url),
      Err(DetectorBuilderError::InvalidParameter { .. })
    ));

    let url = Url::parse("detector:?max=0").unwrap();
    let builder = DetectorBuilder::from_url(&url).unwrap();
    assert!(matches!(
      builder.build(&[1, 5, 8400]),
      Err(DetectorBuilderError::Config(ConfigError::ZeroMaxResults))
    ));

    let url = Url::parse("labels:///tmp/x").unwrap();
    assert!(matches!(
      DetectorBuilder::from_url(&url),
      Err(DetectorBuilderError::SchemeMismatch)
    ));
  }

  #[test]
  fn layout_is_fixed_at_build_time() {
    let detector = DetectorBuilder::default()
      .labels(["person", "bicycle", "car"].into_iter().collect())
      .build(&[1, 7, 8])
      .unwrap();
    assert_eq!(
      detector.layout(),
      TensorLayout::ChannelMajor {
        value_count: 7,
        detection_count: 8
      }
    );

    let mut data = vec![0.0; 7 * 8];
    for (v, x) in [0.5, 0.5, 0.2, 0.2, 0.1, 0.2, 0.9].into_iter().enumerate() {
      data[v * 8 + 5] = x;
    }
    // 每帧携带的形状不参与布局推断
    let frame = RawOutputTensor::new(vec![1, 8, 7], data);
    let result = detector.infer(&frame).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].label, "car");
  }

  #[test]
  fn malformed_model_shape_uses_fallback() {
    let detector = DetectorBuilder::default().build(&[8400]).unwrap();
    assert_eq!(detector.layout(), TensorLayout::default());
  }
}
