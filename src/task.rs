// 该文件是 Visionary （远见） 项目的一部分。
// src/task.rs - 分类任务
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

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::{
  frame::RawImage,
  model::Model,
  output::Render,
  pipeline::{Classification, ClassificationPipeline},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, pipeline: &ClassificationPipeline<M>, output: O)
  -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RawImage>,
  M: Model,
  O: Render<RawImage, Classification, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    pipeline: &ClassificationPipeline<M>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始分类...");
    let now = Instant::now();
    let result = pipeline.classify(&frame)?;
    let elapsed = now.elapsed();
    info!("分类完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("输出完成，总耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

const DEFAULT_REPEAT_TIMES: usize = 1000;
const WARMUP_TIMES: usize = 2;

/// 对同一张图像反复分类，用于测量平均耗时
#[derive(Debug)]
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat: DEFAULT_REPEAT_TIMES,
    }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }
}

/// 跳过预热轮次后的平均耗时；样本不足时使用全部样本
fn average_elapsed(times: &[Duration]) -> Option<Duration> {
  let samples = if times.len() > WARMUP_TIMES {
    &times[WARMUP_TIMES..]
  } else {
    times
  };
  if samples.is_empty() {
    return None;
  }
  Some(samples.iter().sum::<Duration>() / samples.len() as u32)
}

impl<
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RawImage>,
  M: Model,
  O: Render<RawImage, Classification, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    pipeline: &ClassificationPipeline<M>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，重复分类 {} 次...", self.repeat);
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = pipeline.classify(&frame)?;
      let elapsed = now.elapsed();
      info!("({})分类完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &result)?;
      times.push(elapsed);
    }

    if let Some(average) = average_elapsed(&times) {
      warn!("平均分类时间: {:.2?}", average);
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::{cell::RefCell, convert::Infallible};

  use super::*;
  use crate::{
    decode::{BinaryLabels, Decoder},
    error::PipelineError,
    frame::NormalizedTensor,
    model::ScoreVector,
    preprocess::{NormalizeMode, Normalizer, TargetSize},
  };

  struct Constant(f32);

  impl Model for Constant {
    type Error = Infallible;

    fn infer(&self, _tensor: &NormalizedTensor) -> Result<ScoreVector, Self::Error> {
      Ok(ScoreVector::from(vec![self.0]))
    }
  }

  #[derive(Default)]
  struct Collect(RefCell<Vec<String>>);

  impl Render<RawImage, Classification> for &Collect {
    type Error = std::io::Error;

    fn render_result(&self, _frame: &RawImage, result: &Classification) -> Result<(), Self::Error> {
      self.0.borrow_mut().push(result.to_string());
      Ok(())
    }
  }

  fn pipeline(score: f32) -> ClassificationPipeline<Constant> {
    ClassificationPipeline::new(
      Constant(score),
      Normalizer::new(TargetSize::square(4), NormalizeMode::UnitScale),
      Decoder::binary(BinaryLabels::new("Dog", "Cat")),
    )
  }

  fn frame() -> RawImage {
    RawImage::filled(6, 6, &[128, 128, 128]).unwrap()
  }

  #[test]
  fn one_shot_renders_once() {
    let collect = Collect::default();
    OneShotTask
      .run_task(std::iter::once(frame()), &pipeline(0.9), &collect)
      .unwrap();
    assert_eq!(*collect.0.borrow(), vec!["Dog".to_string()]);
  }

  #[test]
  fn one_shot_without_input_fails() {
    let collect = Collect::default();
    let result = OneShotTask.run_task(std::iter::empty(), &pipeline(0.9), &collect);
    assert!(result.is_err());
    assert!(collect.0.borrow().is_empty());
  }

  #[test]
  fn pipeline_errors_surface_from_task() {
    let collect = Collect::default();
    let bad = RawImage::filled(2, 2, &[1, 2]).unwrap();
    let err = OneShotTask
      .run_task(std::iter::once(bad), &pipeline(0.9), &collect)
      .unwrap_err();
    assert!(matches!(
      err.downcast_ref::<PipelineError>(),
      Some(PipelineError::UnsupportedChannelCount(2))
    ));
  }

  #[test]
  fn repeat_shot_renders_each_round() {
    let collect = Collect::default();
    RepeatShotTask::default()
      .with_repeat(5)
      .run_task(std::iter::once(frame()), &pipeline(0.1), &collect)
      .unwrap();
    assert_eq!(collect.0.borrow().len(), 5);
    assert!(collect.0.borrow().iter().all(|s| s == "Cat"));
  }

  #[test]
  fn average_skips_warmup_rounds() {
    let ms = Duration::from_millis;
    assert_eq!(
      average_elapsed(&[ms(100), ms(100), ms(10), ms(20)]),
      Some(ms(15))
    );
    assert_eq!(average_elapsed(&[ms(8), ms(4)]), Some(ms(6)));
    assert_eq!(average_elapsed(&[]), None);
  }
}
