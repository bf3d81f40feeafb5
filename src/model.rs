// 该文件是 Visionary （远见） 项目的一部分。
// src/model.rs - 模型与推理调用
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

use std::{ops::Deref, sync::Arc};

use tracing::{debug, error};

use crate::{error::PipelineError, frame::NormalizedTensor};

/// 模型输出的原始得分，顺序与标签表一致
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVector(Box<[f32]>);

impl ScoreVector {
  pub fn as_slice(&self) -> &[f32] {
    &self.0
  }
}

impl From<Vec<f32>> for ScoreVector {
  fn from(scores: Vec<f32>) -> Self {
    ScoreVector(scores.into_boxed_slice())
  }
}

impl From<&[f32]> for ScoreVector {
  fn from(scores: &[f32]) -> Self {
    ScoreVector(scores.into())
  }
}

impl Deref for ScoreVector {
  type Target = [f32];

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

/// 外部提供的分类模型，加载后只读
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, input: &NormalizedTensor) -> Result<ScoreVector, Self::Error>;
}

impl<M: Model + ?Sized> Model for &M {
  type Error = M::Error;

  fn infer(&self, input: &NormalizedTensor) -> Result<ScoreVector, Self::Error> {
    (**self).infer(input)
  }
}

impl<M: Model + ?Sized> Model for Box<M> {
  type Error = M::Error;

  fn infer(&self, input: &NormalizedTensor) -> Result<ScoreVector, Self::Error> {
    (**self).infer(input)
  }
}

impl<M: Model + ?Sized> Model for Arc<M> {
  type Error = M::Error;

  fn infer(&self, input: &NormalizedTensor) -> Result<ScoreVector, Self::Error> {
    (**self).infer(input)
  }
}

/// 调用一次模型，失败统一包装为 `InferenceFailure`，不重试
pub fn infer<M: Model + ?Sized>(
  model: &M,
  tensor: &NormalizedTensor,
) -> Result<ScoreVector, PipelineError> {
  debug!("执行模型推理, 输入形状: {:?}", tensor.shape());
  let now = std::time::Instant::now();
  let scores = model.infer(tensor).map_err(|e| {
    error!("模型推理失败: {}", e);
    PipelineError::inference(e)
  })?;
  debug!(
    "推理完成，耗时: {:.2?}, 得分数量: {}",
    now.elapsed(),
    scores.len()
  );
  Ok(scores)
}

#[cfg(feature = "model_onnx")]
mod onnx;
#[cfg(feature = "model_onnx")]
pub use self::onnx::{OnnxClassifier, OnnxClassifierBuilder, OnnxModelError};
