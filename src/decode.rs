// 该文件是 Visionary （远见） 项目的一部分。
// src/decode.rs - 模型得分解码
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

use std::{cmp::Ordering, sync::Arc};

use tracing::{debug, error};

use crate::{
  error::{LoadError, PipelineError},
  model::ScoreVector,
  vocabulary::LabelVocabulary,
};

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const SCORE_EPSILON: f32 = 1e-6;

/// 单个分类结果
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
  pub label: String,
  /// 所选标签对应的概率，位于 [0, 1]
  pub confidence: f32,
}

impl ClassificationResult {
  pub fn new(label: impl Into<String>, confidence: f32) -> Self {
    Self {
      label: label.into(),
      confidence,
    }
  }
}

// NaN 排在所有数值之后
fn rank(a: f32, b: f32) -> Ordering {
  match (a.is_nan(), b.is_nan()) {
    (true, true) => Ordering::Equal,
    (true, false) => Ordering::Greater,
    (false, true) => Ordering::Less,
    (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
  }
}

/// 取得分最高的 `k` 个类别，同分时索引小者优先。
///
/// 置信度直接使用模型给出的得分，不做重新归一化。
pub fn decode_topk(
  scores: &[f32],
  vocabulary: &LabelVocabulary,
  k: usize,
) -> Result<Vec<ClassificationResult>, PipelineError> {
  if scores.is_empty() {
    error!("得分向量为空");
    return Err(PipelineError::EmptyScoreVector);
  }
  if vocabulary.len() != scores.len() {
    error!(
      "标签表长度 {} 与得分向量长度 {} 不一致",
      vocabulary.len(),
      scores.len()
    );
    return Err(PipelineError::VocabularyMismatch {
      vocabulary: vocabulary.len(),
      scores: scores.len(),
    });
  }

  let mut order: Vec<usize> = (0..scores.len()).collect();
  // 稳定排序保证同分时保留原始索引顺序
  order.sort_by(|&a, &b| rank(scores[a], scores[b]));

  let results: Vec<ClassificationResult> = order
    .into_iter()
    .take(k)
    .filter_map(|index| {
      vocabulary
        .get(index)
        .map(|label| ClassificationResult::new(label, scores[index]))
    })
    .collect();
  debug!("Top-{} 解码结果: {:?}", k, results);
  Ok(results)
}

/// 二分类阈值解码，严格大于阈值才判为正类
pub fn decode_binary(
  score: f32,
  positive_label: &str,
  negative_label: &str,
  threshold: f32,
) -> Result<ClassificationResult, PipelineError> {
  if !(0.0..=1.0).contains(&threshold) {
    error!("阈值 {} 超出 [0, 1] 范围", threshold);
    return Err(PipelineError::InvalidThreshold(threshold));
  }
  if score.is_nan() || !(-SCORE_EPSILON..=1.0 + SCORE_EPSILON).contains(&score) {
    error!("得分 {} 超出 [0, 1] 范围", score);
    return Err(PipelineError::InvalidScore(score));
  }
  let score = score.clamp(0.0, 1.0);

  let result = if score > threshold {
    ClassificationResult::new(positive_label, score)
  } else {
    ClassificationResult::new(negative_label, 1.0 - score)
  };
  debug!("二分类解码: 得分 {} 阈值 {} -> {:?}", score, threshold, result);
  Ok(result)
}

/// 二分类的标签与阈值
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryLabels {
  pub positive: String,
  pub negative: String,
  pub threshold: f32,
}

impl BinaryLabels {
  pub fn new(positive: impl Into<String>, negative: impl Into<String>) -> Self {
    Self {
      positive: positive.into(),
      negative: negative.into(),
      threshold: DEFAULT_THRESHOLD,
    }
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }
}

/// 结果展示方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStyle {
  /// `"{label} ({confidence:.2}%)"`
  WithConfidence,
  /// 仅显示标签
  LabelOnly,
}

/// 解码器在配置阶段确定
#[derive(Debug, Clone)]
pub enum Decoder {
  TopK {
    vocabulary: Arc<LabelVocabulary>,
    k: usize,
  },
  Binary(BinaryLabels),
}

impl Decoder {
  /// `k` 为 0 时没有任何结果可返回，在配置阶段即拒绝
  pub fn top_k(
    vocabulary: impl Into<Arc<LabelVocabulary>>,
    k: usize,
  ) -> Result<Self, LoadError> {
    if k == 0 {
      return Err(LoadError::invalid("top", "0"));
    }
    Ok(Decoder::TopK {
      vocabulary: vocabulary.into(),
      k,
    })
  }

  pub fn binary(labels: BinaryLabels) -> Self {
    Decoder::Binary(labels)
  }

  pub fn style(&self) -> ResultStyle {
    match self {
      Decoder::TopK { .. } => ResultStyle::WithConfidence,
      Decoder::Binary(_) => ResultStyle::LabelOnly,
    }
  }

  pub fn decode(&self, scores: &ScoreVector) -> Result<Vec<ClassificationResult>, PipelineError> {
    match self {
      Decoder::TopK { vocabulary, k } => decode_topk(scores, vocabulary, *k),
      Decoder::Binary(labels) => {
        // 二分类模型只输出一个标量，多余的输出被忽略
        let score = *scores.first().ok_or(PipelineError::EmptyScoreVector)?;
        if scores.len() > 1 {
          debug!("二分类模型输出了 {} 个得分，仅使用第一个", scores.len());
        }
        decode_binary(score, &labels.positive, &labels.negative, labels.threshold)
          .map(|result| vec![result])
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn vocabulary(n: usize) -> LabelVocabulary {
    LabelVocabulary::new((0..n).map(|i| format!("class_{}", i)))
  }

  fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-6
  }

  #[test]
  fn binary_threshold_is_strict() {
    let result = decode_binary(0.5, "Dog", "Cat", 0.5).unwrap();
    assert_eq!(result.label, "Cat");
    assert!(approx(result.confidence, 0.5));
  }

  #[test]
  fn binary_confidence_follows_chosen_label() {
    let dog = decode_binary(0.7, "Dog", "Cat", 0.5).unwrap();
    assert_eq!(dog.label, "Dog");
    assert!(approx(dog.confidence, 0.7));

    let cat = decode_binary(0.3, "Dog", "Cat", 0.5).unwrap();
    assert_eq!(cat.label, "Cat");
    assert!(approx(cat.confidence, 0.7));
  }

  #[test]
  fn binary_custom_threshold() {
    assert_eq!(decode_binary(0.6, "Dog", "Cat", 0.8).unwrap().label, "Cat");
    assert_eq!(decode_binary(0.81, "Dog", "Cat", 0.8).unwrap().label, "Dog");
  }

  #[test]
  fn binary_rejects_out_of_range_scores() {
    for score in [-0.1, 1.5, f32::NAN, f32::INFINITY] {
      assert!(matches!(
        decode_binary(score, "Dog", "Cat", 0.5),
        Err(PipelineError::InvalidScore(_))
      ));
    }
  }

  #[test]
  fn binary_tolerates_rounding_noise() {
    let result = decode_binary(1.0 + 1e-7, "Dog", "Cat", 0.5).unwrap();
    assert_eq!(result.label, "Dog");
    assert_eq!(result.confidence, 1.0);

    let result = decode_binary(-1e-7, "Dog", "Cat", 0.5).unwrap();
    assert_eq!(result.label, "Cat");
    assert_eq!(result.confidence, 1.0);
  }

  #[test]
  fn topk_picks_highest_score() {
    let scores = [0.1, 0.6, 0.3];
    let results = decode_topk(&scores, &vocabulary(3), 1).unwrap();
    assert_eq!(results, vec![ClassificationResult::new("class_1", 0.6)]);
  }

  #[test]
  fn topk_ties_prefer_lower_index() {
    let scores = [0.2, 0.4, 0.4, 0.0];
    let results = decode_topk(&scores, &vocabulary(4), 2).unwrap();
    assert_eq!(results[0].label, "class_1");
    assert_eq!(results[1].label, "class_2");
  }

  #[test]
  fn topk_is_deterministic() {
    let scores: Vec<f32> = (0..1000).map(|i| ((i * 37) % 101) as f32 / 100.0).collect();
    let vocabulary = vocabulary(1000);
    let first = decode_topk(&scores, &vocabulary, 5).unwrap();
    for _ in 0..10 {
      assert_eq!(decode_topk(&scores, &vocabulary, 5).unwrap(), first);
    }
  }

  #[test]
  fn topk_passes_scores_through_without_renormalizing() {
    let scores = [2.0, 6.0];
    let results = decode_topk(&scores, &vocabulary(2), 2).unwrap();
    assert_eq!(results[0].confidence, 6.0);
    assert_eq!(results[1].confidence, 2.0);
  }

  #[test]
  fn topk_nan_ranks_last() {
    let scores = [f32::NAN, 0.1, 0.2];
    let results = decode_topk(&scores, &vocabulary(3), 3).unwrap();
    assert_eq!(results[0].label, "class_2");
    assert_eq!(results[2].label, "class_0");
  }

  #[test]
  fn topk_k_bounds() {
    let scores = [0.5, 0.5];
    assert!(decode_topk(&scores, &vocabulary(2), 0).unwrap().is_empty());
    assert_eq!(decode_topk(&scores, &vocabulary(2), 10).unwrap().len(), 2);
  }

  #[test]
  fn topk_rejects_empty_scores() {
    assert!(matches!(
      decode_topk(&[], &vocabulary(3), 1),
      Err(PipelineError::EmptyScoreVector)
    ));
  }

  #[test]
  fn topk_rejects_vocabulary_mismatch() {
    let scores = vec![0.001; 999];
    assert!(matches!(
      decode_topk(&scores, &vocabulary(1000), 1),
      Err(PipelineError::VocabularyMismatch {
        vocabulary: 1000,
        scores: 999
      })
    ));
  }

  #[test]
  fn binary_decoder_uses_first_score() {
    let decoder = Decoder::binary(BinaryLabels::new("Dog", "Cat"));
    let results = decoder.decode(&ScoreVector::from(vec![0.9, 0.1])).unwrap();
    assert_eq!(results, vec![ClassificationResult::new("Dog", 0.9)]);
    assert_eq!(decoder.style(), ResultStyle::LabelOnly);
  }

  #[test]
  fn binary_decoder_rejects_empty_output() {
    let decoder = Decoder::binary(BinaryLabels::new("Dog", "Cat"));
    assert!(matches!(
      decoder.decode(&ScoreVector::from(Vec::new())),
      Err(PipelineError::EmptyScoreVector)
    ));
  }

  #[test]
  fn binary_rejects_threshold_outside_unit_range() {
    assert!(matches!(
      decode_binary(0.99, "Dog", "Cat", 1.5),
      Err(PipelineError::InvalidThreshold(t)) if t == 1.5
    ));
    assert!(matches!(
      decode_binary(0.2, "Dog", "Cat", -0.1),
      Err(PipelineError::InvalidThreshold(_))
    ));

    let decoder = Decoder::binary(BinaryLabels::new("Dog", "Cat").with_threshold(f32::NAN));
    assert!(matches!(
      decoder.decode(&ScoreVector::from(vec![0.99])),
      Err(PipelineError::InvalidThreshold(t)) if t.is_nan()
    ));
  }

  #[test]
  fn binary_accepts_threshold_bounds() {
    assert_eq!(decode_binary(1.0, "Dog", "Cat", 1.0).unwrap().label, "Cat");
    assert_eq!(decode_binary(0.01, "Dog", "Cat", 0.0).unwrap().label, "Dog");
  }

  #[test]
  fn topk_decoder_rejects_zero_k() {
    assert!(matches!(
      Decoder::top_k(vocabulary(3), 0),
      Err(LoadError::InvalidParameter { name: "top", .. })
    ));
  }

  #[test]
  fn topk_decoder_style() {
    let decoder = Decoder::top_k(vocabulary(2), 1).unwrap();
    assert_eq!(decoder.style(), ResultStyle::WithConfidence);
    let results = decoder.decode(&ScoreVector::from(vec![0.25, 0.75])).unwrap();
    assert_eq!(results[0].label, "class_1");
  }
}
