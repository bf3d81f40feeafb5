// 该文件是 Visionary （远见） 项目的一部分。
// src/error.rs - 错误定义
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

#[cfg(feature = "model_onnx")]
use crate::model::OnnxModelError;
use crate::vocabulary::VocabularyError;

/// 单次请求内的错误，只影响当前请求
#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("不支持的通道数: {0}（仅支持 3 或 4）")]
  UnsupportedChannelCount(u8),
  #[error("图像尺寸无效: {width}x{height}")]
  InvalidDimensions { width: u32, height: u32 },
  #[error("像素缓冲区长度不匹配: 期望 {expected}, 实际 {actual}")]
  PixelBufferMismatch { expected: usize, actual: usize },
  #[error("模型推理失败: {0}")]
  InferenceFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("得分向量为空")]
  EmptyScoreVector,
  #[error("标签表长度 {vocabulary} 与得分向量长度 {scores} 不一致")]
  VocabularyMismatch { vocabulary: usize, scores: usize },
  #[error("得分 {0} 超出 [0, 1] 范围")]
  InvalidScore(f32),
  #[error("阈值 {0} 超出 [0, 1] 范围")]
  InvalidThreshold(f32),
}

impl PipelineError {
  pub fn inference<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    PipelineError::InferenceFailure(Box::new(err))
  }
}

/// 启动阶段的错误，出现时流水线无法构建
#[derive(Error, Debug)]
pub enum LoadError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("缺少参数: {0}")]
  MissingParameter(&'static str),
  #[error("参数 {name} 的取值无效: {value}")]
  InvalidParameter { name: &'static str, value: String },
  #[error("标签表加载错误: {0}")]
  Vocabulary(#[from] VocabularyError),
  #[cfg(feature = "model_onnx")]
  #[error("模型加载错误: {0}")]
  Model(#[from] OnnxModelError),
}

impl LoadError {
  pub fn invalid(name: &'static str, value: impl Into<String>) -> Self {
    LoadError::InvalidParameter {
      name,
      value: value.into(),
    }
  }
}
