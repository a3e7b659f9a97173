// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/model/decoder.rs - 检测输出解码
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
use tracing::{debug, warn};

use crate::{
  label::LabelTable,
  model::{DecoderConfig, DetectionRecord},
  tensor::{ShapeError, TensorLayout, infer_layout},
};

/// 只有单一分数、没有类别信息时使用的标签
pub const GENERIC_LABEL: &str = "Object";

/// 值数量达到该值时按类别分数解码
const CLASS_SCORES_MIN_VALUES: usize = 7;
/// 类别分数分支读取的分数个数
const CLASS_SCORES: usize = 3;
/// 候选优先布局下，值数量达到该值时按 objectness × 类别分数解码
const OBJECTNESS_MIN_VALUES: usize = 8;

const BOX_VALUES: usize = 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
  #[error("张量形状无效: {0}")]
  InvalidShape(#[from] ShapeError),
  #[error("下标越界: {index} >= {len}")]
  IndexOutOfRange { index: usize, len: usize },
}

/// 单次解码的诊断统计，不影响结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeStats {
  pub scanned: usize,
  pub invalid: usize,
  pub out_of_range: usize,
  pub accepted: usize,
  pub min_confidence: Option<f32>,
  pub max_confidence: Option<f32>,
}

impl DecodeStats {
  fn observe(&mut self, confidence: f32) {
    if !confidence.is_finite() {
      return;
    }
    self.min_confidence = Some(self.min_confidence.map_or(confidence, |m| m.min(confidence)));
    self.max_confidence = Some(self.max_confidence.map_or(confidence, |m| m.max(confidence)));
  }
}

#[derive(Debug, Clone, Default)]
pub struct Decoded {
  pub records: Vec<DetectionRecord>,
  pub stats: DecodeStats,
}

struct Candidate {
  x: f32,
  y: f32,
  w: f32,
  h: f32,
  confidence: f32,
  class_id: Option<usize>,
}

impl Candidate {
  fn box_is_finite(&self) -> bool {
    self.x.is_finite() && self.y.is_finite() && self.w.is_finite() && self.h.is_finite()
  }
}

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 形状无法解析时退回默认布局（通道优先，5 个值，8400 个候选）
pub fn layout_or_fallback(shape: &[usize]) -> TensorLayout {
  match infer_layout(shape) {
    Ok(layout) => layout,
    Err(e) => {
      let fallback = TensorLayout::default();
      warn!("无法从形状 {:?} 推断布局: {}，使用默认布局 {:?}", shape, e, fallback);
      fallback
    }
  }
}

/// 将原始输出缓冲区解码为按置信度降序排列的检测结果。
///
/// 该函数不会失败：形状无效时使用默认布局，越界的候选被跳过，
/// 没有候选通过阈值时返回空序列。
pub fn decode(
  buffer: &[f32],
  shape: &[usize],
  labels: &LabelTable,
  max_results: usize,
  confidence_threshold: f32,
  box_size_bounds: (f32, f32),
) -> Vec<DetectionRecord> {
  let layout = layout_or_fallback(shape);
  let config = DecoderConfig::default()
    .with_max_results(max_results)
    .with_confidence_threshold(confidence_threshold)
    .with_box_size_bounds(box_size_bounds.0, box_size_bounds.1);
  decode_with_layout(buffer, layout, labels, &config).records
}

/// 使用已确定的布局解码。
///
/// 扫描按候选序号进行，接受数量达到 `scan_limit` 时提前结束，
/// 因此候选池是扫描顺序上的前 N 个匹配项，而非全局最高的 N 个；
/// 之后再做稳定排序并截断到 `max_results`。
pub fn decode_with_layout(
  buffer: &[f32],
  layout: TensorLayout,
  labels: &LabelTable,
  config: &DecoderConfig,
) -> Decoded {
  let mut stats = DecodeStats::default();
  let mut records = Vec::with_capacity(config.scan_limit.min(64));

  // 缓冲区放不下的候选不逐个扫描
  let readable = layout.readable_detections(buffer.len());
  let mut stopped_early = false;

  for detection in 0..readable {
    stats.scanned += 1;

    let candidate = match read_candidate(buffer, layout, detection) {
      Ok(candidate) => candidate,
      Err(e) => {
        stats.out_of_range += 1;
        if stats.out_of_range == 1 {
          debug!("候选 {} 被跳过: {}", detection, e);
        }
        continue;
      }
    };

    if !candidate.box_is_finite() {
      stats.invalid += 1;
      continue;
    }

    stats.observe(candidate.confidence);

    if !(candidate.confidence > config.confidence_threshold
      && config.box_size_ok(candidate.w)
      && config.box_size_ok(candidate.h))
    {
      continue;
    }

    let (class_id, label) = match candidate.class_id {
      Some(class_id) => (class_id, labels.resolve(class_id)),
      None => (0, GENERIC_LABEL.to_string()),
    };

    records.push(DetectionRecord {
      center_x: candidate.x,
      center_y: candidate.y,
      width: candidate.w,
      height: candidate.h,
      confidence: candidate.confidence,
      class_id,
      label,
    });

    if records.len() >= config.scan_limit {
      stopped_early = true;
      break;
    }
  }

  if !stopped_early && readable < layout.detection_count() {
    let skipped = layout.detection_count() - readable;
    stats.out_of_range += skipped;
    debug!(
      "缓冲区长度 {} 只能容纳 {} 个候选, 跳过其余 {} 个",
      buffer.len(),
      readable,
      skipped
    );
  }

  stats.accepted = records.len();

  // sort_by 是稳定排序，置信度相同的保持扫描顺序
  records.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
  records.truncate(config.max_results);

  debug!(
    "解码完成: 扫描 {}, 无效 {}, 越界 {}, 接受 {}, 返回 {}, 置信度范围 {:?}..{:?}",
    stats.scanned,
    stats.invalid,
    stats.out_of_range,
    stats.accepted,
    records.len(),
    stats.min_confidence,
    stats.max_confidence
  );

  Decoded { records, stats }
}

fn read_candidate(
  buffer: &[f32],
  layout: TensorLayout,
  detection: usize,
) -> Result<Candidate, DecodeError> {
  let value = |v: usize| -> Result<f32, DecodeError> {
    let index = layout.index(detection, v).unwrap_or(usize::MAX);
    buffer
      .get(index)
      .copied()
      .ok_or(DecodeError::IndexOutOfRange {
        index,
        len: buffer.len(),
      })
  };
  let value_count = layout.value_count();

  let (confidence, class_id) = match layout {
    TensorLayout::DetectionMajor { .. } if value_count >= OBJECTNESS_MIN_VALUES => {
      // 此分支不做 logistic 修正
      let objectness = value(BOX_VALUES)?;
      let scores = (BOX_VALUES + 1..value_count)
        .map(value)
        .collect::<Result<Vec<f32>, _>>()?;
      let (best, class_id) = argmax(scores);
      (objectness * best, Some(class_id))
    }
    _ if value_count >= CLASS_SCORES_MIN_VALUES => {
      let mut scores = [0.0f32; CLASS_SCORES];
      for (i, score) in scores.iter_mut().enumerate() {
        *score = value(BOX_VALUES + i)?;
      }
      if scores.iter().any(|s| !(0.0..=1.0).contains(s)) {
        scores = scores.map(sigmoid);
      }
      let (best, class_id) = argmax(scores);
      (best, Some(class_id))
    }
    _ => (value(BOX_VALUES)?, None),
  };

  Ok(Candidate {
    x: value(0)?,
    y: value(1)?,
    w: value(2)?,
    h: value(3)?,
    confidence,
    class_id,
  })
}

/// 返回 (最大值, 下标)，相等时取最小下标；NaN 分数不参与比较
fn argmax(scores: impl IntoIterator<Item = f32>) -> (f32, usize) {
  let mut best: Option<(f32, usize)> = None;
  for (idx, score) in scores.into_iter().enumerate() {
    if score.is_nan() {
      continue;
    }
    if best.is_none_or(|(b, _)| score > b) {
      best = Some((score, idx));
    }
  }
  best.unwrap_or((f32::NAN, 0))
}

#[cfg(test)]
mod tests {
  use super::*;

  const EPS: f32 = 1e-6;
  const BOUNDS: (f32, f32) = (0.01, 1.0);

  fn labels() -> LabelTable {
    ["person", "bicycle", "car"].into_iter().collect()
  }

  /// 通道优先缓冲区，`candidates` 中每项为一个候选的全部值
  fn channel_major(value_count: usize, detection_count: usize, candidates: &[(usize, &[f32])]) -> Vec<f32> {
    let mut buffer = vec![0.0; value_count * detection_count];
    for &(i, values) in candidates {
      for (v, &x) in values.iter().enumerate() {
        buffer[v * detection_count + i] = x;
      }
    }
    buffer
  }

  #[test]
  fn single_score_candidate_round_trips() {
    let buffer = channel_major(5, 16, &[(3, &[0.4, 0.6, 0.2, 0.3, 0.8])]);
    let out = decode(&buffer, &[1, 5, 16], &labels(), 10, 0.5, BOUNDS);
    assert_eq!(out.len(), 1);
    let r = &out[0];
    assert!((r.center_x - 0.4).abs() < EPS);
    assert!((r.center_y - 0.6).abs() < EPS);
    assert!((r.width - 0.2).abs() < EPS);
    assert!((r.height - 0.3).abs() < EPS);
    assert!((r.confidence - 0.8).abs() < EPS);
    assert_eq!(r.class_id, 0);
    assert_eq!(r.label, GENERIC_LABEL);
  }

  #[test]
  fn confidence_at_channel_offset_selects_candidate() {
    let n = 8400;
    let mut buffer = vec![0.0; 5 * n];
    buffer[4 * n + 7] = 0.9;
    buffer[7] = 0.5;
    buffer[n + 7] = 0.5;
    buffer[2 * n + 7] = 0.25;
    buffer[3 * n + 7] = 0.25;
    // 其他候选的框再大也不应被接受
    for i in (0..n).filter(|&i| i != 7) {
      buffer[2 * n + i] = 0.5;
      buffer[3 * n + i] = 0.5;
    }
    let out = decode(&buffer, &[1, 5, n], &labels(), 10, 0.5, BOUNDS);
    assert_eq!(out.len(), 1);
    assert!((out[0].confidence - 0.9).abs() < EPS);
    assert!((out[0].width - 0.25).abs() < EPS);
  }

  #[test]
  fn in_range_class_scores_are_used_directly() {
    let buffer = channel_major(7, 8, &[(0, &[0.5, 0.5, 0.2, 0.2, 0.2, 0.9, 0.95])]);
    let out = decode(&buffer, &[1, 7, 8], &labels(), 10, 0.5, BOUNDS);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].confidence, 0.95);
    assert_eq!(out[0].class_id, 2);
    assert_eq!(out[0].label, "car");
  }

  #[test]
  fn out_of_range_class_scores_are_treated_as_logits() {
    let buffer = channel_major(7, 8, &[(1, &[0.5, 0.5, 0.2, 0.2, -2.0, 3.0, 0.5])]);
    let out = decode(&buffer, &[1, 7, 8], &labels(), 10, 0.5, BOUNDS);
    let expected = sigmoid(-2.0).max(sigmoid(3.0)).max(sigmoid(0.5));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].confidence, expected);
    assert_eq!(out[0].class_id, 1);
  }

  #[test]
  fn three_way_tie_picks_lowest_class() {
    let buffer = channel_major(7, 8, &[(0, &[0.5, 0.5, 0.2, 0.2, 0.7, 0.7, 0.7])]);
    let out = decode(&buffer, &[1, 7, 8], &labels(), 10, 0.5, BOUNDS);
    assert_eq!(out[0].class_id, 0);
    assert_eq!(out[0].label, "person");
  }

  #[test]
  fn class_beyond_label_table_gets_synthetic_label() {
    let short: LabelTable = ["person", "bicycle"].into_iter().collect();
    let buffer = channel_major(7, 8, &[(0, &[0.5, 0.5, 0.2, 0.2, 0.1, 0.1, 0.8])]);
    let out = decode(&buffer, &[1, 7, 8], &short, 10, 0.5, BOUNDS);
    assert_eq!(out[0].class_id, 2);
    assert_eq!(out[0].label, "Class 2");
  }

  #[test]
  fn only_three_class_scores_are_read() {
    // 第 4 个及之后的分数既不参与取最大值，也不触发 logistic 修正
    let buffer = channel_major(
      9,
      12,
      &[(0, &[0.5, 0.5, 0.2, 0.2, 0.2, 0.3, 0.6, 0.99, 5.0])],
    );
    let out = decode(&buffer, &[1, 9, 12], &labels(), 10, 0.5, BOUNDS);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].confidence, 0.6);
    assert_eq!(out[0].class_id, 2);
    assert_eq!(out[0].label, "car");
  }

  #[test]
  fn nan_class_score_is_skipped() {
    let buffer = channel_major(7, 8, &[(0, &[0.5, 0.5, 0.2, 0.2, f32::NAN, 0.3, 0.9])]);
    let out = decode(&buffer, &[1, 7, 8], &labels(), 10, 0.5, BOUNDS);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].class_id, 2);
    assert_eq!(out[0].confidence, sigmoid(0.9));

    assert_eq!(argmax([f32::NAN, 0.4, 0.4]), (0.4, 1));
    assert!(argmax([f32::NAN; 3]).0.is_nan());
  }

  #[test]
  fn six_values_use_single_score() {
    let buffer = channel_major(6, 8, &[(2, &[0.5, 0.5, 0.2, 0.2, 0.7, 0.99])]);
    let out = decode(&buffer, &[1, 6, 8], &labels(), 10, 0.5, BOUNDS);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].confidence, 0.7);
    assert_eq!(out[0].class_id, 0);
    assert_eq!(out[0].label, GENERIC_LABEL);
  }

  #[test]
  fn detection_major_seven_values_use_class_scores() {
    // [1, 12, 7]: 12 个候选，每个 7 个值，没有 objectness
    let mut buffer = vec![0.0; 12 * 7];
    buffer[4 * 7..5 * 7].copy_from_slice(&[0.5, 0.5, 0.2, 0.2, 0.1, 0.8, 0.3]);
    buffer[6 * 7..7 * 7].copy_from_slice(&[0.5, 0.5, 0.2, 0.2, -1.0, 2.0, 0.0]);
    let out = decode(&buffer, &[1, 12, 7], &labels(), 10, 0.5, BOUNDS);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].confidence, sigmoid(2.0));
    assert_eq!(out[0].class_id, 1);
    assert_eq!(out[1].confidence, 0.8);
    assert_eq!(out[1].label, "bicycle");
  }

  #[test]
  fn oversized_shape_with_short_buffer_is_skipped() {
    let shape = [1, 5, 1usize << 62];
    let decoded = decode_with_layout(
      &[0.5; 16],
      layout_or_fallback(&shape),
      &labels(),
      &DecoderConfig::default(),
    );
    assert!(decoded.records.is_empty());
    assert_eq!(decoded.stats.scanned, 0);
    assert_eq!(decoded.stats.out_of_range, 1 << 62);
    assert!(decode(&[0.5; 16], &shape, &labels(), 10, 0.5, BOUNDS).is_empty());

    let out = decode(&[0.5; 16], &[1, usize::MAX, 8], &labels(), 10, 0.1, BOUNDS);
    assert_eq!(out.len(), 2);
  }

  #[test]
  fn detection_major_uses_objectness_without_sigmoid() {
    // [1, 10, 8]: 10 个候选，每个 8 个值
    let mut buffer = vec![0.0; 10 * 8];
    buffer[2 * 8..3 * 8].copy_from_slice(&[0.5, 0.5, 0.3, 0.3, 0.8, 0.1, 0.9, 0.2]);
    let out = decode(&buffer, &[1, 10, 8], &labels(), 10, 0.5, BOUNDS);
    assert_eq!(out.len(), 1);
    assert!((out[0].confidence - 0.72).abs() < EPS);
    assert_eq!(out[0].class_id, 1);

    // 越界分数在此分支下不被变换
    buffer[2 * 8 + 6] = 2.0;
    let out = decode(&buffer, &[1, 10, 8], &labels(), 10, 0.5, BOUNDS);
    assert!((out[0].confidence - 1.6).abs() < EPS);
  }

  #[test]
  fn non_finite_box_is_never_accepted() {
    let buffer = channel_major(
      5,
      8,
      &[
        (0, &[f32::NAN, 0.5, 0.2, 0.2, 0.99]),
        (1, &[0.5, 0.5, f32::INFINITY, 0.2, 0.99]),
        (2, &[0.5, 0.5, 0.2, 0.2, 0.6]),
      ],
    );
    let decoded = decode_with_layout(
      &buffer,
      layout_or_fallback(&[1, 5, 8]),
      &labels(),
      &DecoderConfig::default(),
    );
    assert_eq!(decoded.records.len(), 1);
    assert!((decoded.records[0].confidence - 0.6).abs() < EPS);
    assert_eq!(decoded.stats.invalid, 2);
  }

  #[test]
  fn box_size_bounds_are_strict() {
    let buffer = channel_major(
      5,
      8,
      &[
        (0, &[0.5, 0.5, 0.005, 0.2, 0.9]),
        (1, &[0.5, 0.5, 0.2, 1.0, 0.9]),
        (2, &[0.5, 0.5, 0.01, 0.2, 0.9]),
        (3, &[0.5, 0.5, 0.02, 0.99, 0.9]),
      ],
    );
    let out = decode(&buffer, &[1, 5, 8], &labels(), 10, 0.5, BOUNDS);
    assert_eq!(out.len(), 1);
    assert!((out[0].width - 0.02).abs() < EPS);
  }

  #[test]
  fn threshold_is_exclusive() {
    let buffer = channel_major(5, 8, &[(0, &[0.5, 0.5, 0.2, 0.2, 0.5])]);
    assert!(decode(&buffer, &[1, 5, 8], &labels(), 10, 0.5, BOUNDS).is_empty());
  }

  #[test]
  fn output_is_sorted_and_capped() {
    let scores = [0.6, 0.9, 0.7, 0.95, 0.8, 0.65];
    let candidates: Vec<(usize, Vec<f32>)> = scores
      .iter()
      .enumerate()
      .map(|(i, &s)| (i, vec![0.5, 0.5, 0.2, 0.2, s]))
      .collect();
    let refs: Vec<(usize, &[f32])> = candidates.iter().map(|(i, v)| (*i, v.as_slice())).collect();
    let buffer = channel_major(5, 8, &refs);

    let out = decode(&buffer, &[1, 5, 8], &labels(), 10, 0.5, BOUNDS);
    assert_eq!(out.len(), 6);
    assert!(out.windows(2).all(|w| w[0].confidence >= w[1].confidence));

    // 上限为 3 时只有扫描顺序上的前三个进入候选池
    let out = decode(&buffer, &[1, 5, 8], &labels(), 3, 0.5, BOUNDS);
    let confidences: Vec<f32> = out.iter().map(|r| r.confidence).collect();
    assert_eq!(confidences, vec![0.9, 0.7, 0.6]);
  }

  #[test]
  fn wider_scan_limit_ranks_more_candidates() {
    let buffer = channel_major(
      5,
      8,
      &[
        (0, &[0.5, 0.5, 0.2, 0.2, 0.6]),
        (1, &[0.5, 0.5, 0.2, 0.2, 0.7]),
        (2, &[0.5, 0.5, 0.2, 0.2, 0.8]),
        (3, &[0.5, 0.5, 0.2, 0.2, 0.9]),
      ],
    );
    let config = DecoderConfig::default().with_max_results(2).with_scan_limit(4);
    let decoded = decode_with_layout(&buffer, layout_or_fallback(&[1, 5, 8]), &labels(), &config);
    let confidences: Vec<f32> = decoded.records.iter().map(|r| r.confidence).collect();
    assert_eq!(confidences, vec![0.9, 0.8]);
    assert_eq!(decoded.stats.accepted, 4);
  }

  #[test]
  fn equal_confidences_keep_scan_order() {
    let buffer = channel_major(
      5,
      8,
      &[
        (0, &[0.1, 0.5, 0.2, 0.2, 0.7]),
        (1, &[0.2, 0.5, 0.2, 0.2, 0.7]),
        (2, &[0.3, 0.5, 0.2, 0.2, 0.7]),
      ],
    );
    let out = decode(&buffer, &[1, 5, 8], &labels(), 10, 0.5, BOUNDS);
    let xs: Vec<f32> = out.iter().map(|r| r.center_x).collect();
    assert_eq!(xs, vec![0.1, 0.2, 0.3]);
  }

  #[test]
  fn short_buffer_skips_candidates() {
    let mut buffer = channel_major(5, 8, &[(0, &[0.5, 0.5, 0.2, 0.2, 0.9])]);
    buffer.truncate(4 * 8 + 2);
    let decoded = decode_with_layout(
      &buffer,
      layout_or_fallback(&[1, 5, 8]),
      &labels(),
      &DecoderConfig::default(),
    );
    assert_eq!(decoded.records.len(), 1);
    assert_eq!(decoded.stats.out_of_range, 6);
  }

  #[test]
  fn invalid_shape_falls_back_to_default_layout() {
    let n = crate::tensor::FALLBACK_DETECTION_COUNT;
    let mut buffer = vec![0.0; 5 * n];
    buffer[0] = 0.5;
    buffer[n] = 0.5;
    buffer[2 * n] = 0.2;
    buffer[3 * n] = 0.2;
    buffer[4 * n] = 0.9;
    let out = decode(&buffer, &[5, n], &labels(), 10, 0.5, BOUNDS);
    assert_eq!(out.len(), 1);
    assert!(decode(&[], &[], &labels(), 10, 0.5, BOUNDS).is_empty());
  }

  #[test]
  fn stats_track_confidence_range() {
    let buffer = channel_major(
      5,
      8,
      &[
        (0, &[0.5, 0.5, 0.2, 0.2, 0.1]),
        (1, &[0.5, 0.5, 0.2, 0.2, 0.4]),
        (2, &[0.5, 0.5, 0.2, 0.2, 0.3]),
      ],
    );
    let decoded = decode_with_layout(
      &buffer,
      layout_or_fallback(&[1, 5, 8]),
      &labels(),
      &DecoderConfig::default(),
    );
    assert!(decoded.records.is_empty());
    assert_eq!(decoded.stats.min_confidence, Some(0.1));
    assert_eq!(decoded.stats.max_confidence, Some(0.4));
  }
}
