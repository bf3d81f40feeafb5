// 该文件是 Visionary （远见） 项目的一部分。
// src/model/onnx.rs - ONNX 分类模型
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, error, info};
use tract_onnx::prelude::*;

use crate::{
  frame::{NormalizedTensor, RGB_CHANNELS, TensorLayout},
  model::{Model, ScoreVector},
  preprocess::TargetSize,
};

const DEFAULT_INPUT_SIZE: TargetSize = TargetSize::square(224);

type OnnxPlan = TypedRunnableModel<TypedModel>;

#[derive(Error, Debug)]
pub enum OnnxModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("tract 错误: {0}")]
  TractError(TractError),
  #[error("输入尺寸不匹配: 期望 {expected}, 实际 {actual}")]
  InputSizeMismatch {
    expected: TargetSize,
    actual: TargetSize,
  },
  #[error("模型没有输出")]
  MissingOutput,
}

impl From<TractError> for OnnxModelError {
  fn from(err: TractError) -> Self {
    OnnxModelError::TractError(err)
  }
}

/// 运行在 tract 上的 ONNX 分类模型
pub struct OnnxClassifier {
  plan: OnnxPlan,
  input_size: TargetSize,
  layout: TensorLayout,
}

pub struct OnnxClassifierBuilder {
  model_path: PathBuf,
  input_size: TargetSize,
  layout: TensorLayout,
}

impl OnnxClassifierBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      input_size: DEFAULT_INPUT_SIZE,
      layout: TensorLayout::default(),
    }
  }

  pub fn input_size(mut self, input_size: TargetSize) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn layout(mut self, layout: TensorLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn build(self) -> Result<OnnxClassifier, OnnxModelError> {
    info!("加载模型文件: {}", self.model_path.display());
    let metadata = std::fs::metadata(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      metadata.len() as f64 / (1024.0 * 1024.0)
    );

    let shape = input_shape(self.input_size, self.layout);
    debug!("模型输入形状: {:?} ({:?})", shape, self.layout);

    let model = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .map_err(|e| {
        error!("无法解析 ONNX 模型: {}", e);
        e
      })?
      .with_input_fact(0, f32::fact(shape).into())?
      .into_typed()?;
    let classifier = OnnxClassifier::from_typed_model(model, self.input_size, self.layout)?;
    info!("模型加载完成");

    Ok(classifier)
  }
}

fn input_shape(size: TargetSize, layout: TensorLayout) -> [usize; 4] {
  let (w, h) = (size.width as usize, size.height as usize);
  match layout {
    TensorLayout::Nhwc => [1, h, w, RGB_CHANNELS],
    TensorLayout::Nchw => [1, RGB_CHANNELS, h, w],
  }
}

impl OnnxClassifier {
  /// 包装已在内存中构建好的 tract 计算图，输入形状须与 `input_size`/`layout` 一致
  pub fn from_typed_model(
    model: TypedModel,
    input_size: TargetSize,
    layout: TensorLayout,
  ) -> Result<Self, OnnxModelError> {
    let plan = model.into_optimized()?.into_runnable()?;
    Ok(OnnxClassifier {
      plan,
      input_size,
      layout,
    })
  }

  pub fn input_size(&self) -> TargetSize {
    self.input_size
  }

  pub fn layout(&self) -> TensorLayout {
    self.layout
  }
}

impl Model for OnnxClassifier {
  type Error = OnnxModelError;

  fn infer(&self, input: &NormalizedTensor) -> Result<ScoreVector, Self::Error> {
    let actual = TargetSize::new(input.width() as u32, input.height() as u32);
    if actual != self.input_size {
      return Err(OnnxModelError::InputSizeMismatch {
        expected: self.input_size,
        actual,
      });
    }

    let (w, h) = (input.width(), input.height());
    let tensor = match self.layout {
      TensorLayout::Nhwc => Tensor::from_shape(&[1, h, w, RGB_CHANNELS], input.as_slice())?,
      TensorLayout::Nchw => Tensor::from_shape(&[1, RGB_CHANNELS, h, w], &input.to_nchw())?,
    };

    let outputs = self.plan.run(tvec!(tensor.into()))?;
    let output = outputs.first().ok_or(OnnxModelError::MissingOutput)?;
    let scores: Vec<f32> = output.to_array_view::<f32>()?.iter().copied().collect();
    debug!("模型输出得分数量: {}", scores.len());

    Ok(ScoreVector::from(scores))
  }
}
