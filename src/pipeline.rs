// 该文件是 Visionary （远见） 项目的一部分。
// src/pipeline.rs - 分类流水线
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

use std::{fmt, path::PathBuf, sync::Arc};

use image::imageops::FilterType;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl,
  decode::{BinaryLabels, ClassificationResult, Decoder, ResultStyle},
  error::{LoadError, PipelineError},
  frame::{RawImage, TensorLayout},
  model::{self, Model},
  output::present,
  preprocess::{ImagenetTransform, NormalizeMode, Normalizer, TargetSize, parse_filter},
  vocabulary::LabelVocabulary,
};

const IMAGENET_SCHEME: &str = "imagenet";
const BINARY_SCHEME: &str = "binary";

const IMAGENET_INPUT_SIZE: TargetSize = TargetSize::square(224);
const BINARY_INPUT_SIZE: TargetSize = TargetSize::square(160);
const DEFAULT_POSITIVE_LABEL: &str = "Dog";
const DEFAULT_NEGATIVE_LABEL: &str = "Cat";

/// 一次分类请求的输出
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
  pub results: Vec<ClassificationResult>,
  pub style: ResultStyle,
}

impl Classification {
  pub fn top1(&self) -> Option<&ClassificationResult> {
    self.results.first()
  }

  pub fn iter(&self) -> impl Iterator<Item = &ClassificationResult> {
    self.results.iter()
  }
}

impl fmt::Display for Classification {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, result) in self.results.iter().enumerate() {
      if i > 0 {
        writeln!(f)?;
      }
      write!(f, "{}", present(result, self.style))?;
    }
    Ok(())
  }
}

/// 持有已加载模型的分类流水线，模型只加载一次并在多次请求间复用
pub struct ClassificationPipeline<M> {
  model: M,
  normalizer: Normalizer,
  decoder: Decoder,
}

impl<M: Model> ClassificationPipeline<M> {
  pub fn new(model: M, normalizer: Normalizer, decoder: Decoder) -> Self {
    Self {
      model,
      normalizer,
      decoder,
    }
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  pub fn normalizer(&self) -> &Normalizer {
    &self.normalizer
  }

  pub fn decoder(&self) -> &Decoder {
    &self.decoder
  }

  pub fn classify(&self, image: &RawImage) -> Result<Classification, PipelineError> {
    debug!(
      "开始分类: {}x{} {} 通道",
      image.width(),
      image.height(),
      image.channels()
    );
    let tensor = self.normalizer.normalize(image)?;
    let scores = model::infer(&self.model, &tensor)?;
    let results = self.decoder.decode(&scores)?;
    Ok(Classification {
      results,
      style: self.decoder.style(),
    })
  }

  /// 只取排名第一的结果
  pub fn classify_top1(&self, image: &RawImage) -> Result<ClassificationResult, PipelineError> {
    self
      .classify(image)?
      .results
      .into_iter()
      .next()
      .ok_or(PipelineError::EmptyScoreVector)
  }
}

#[derive(Debug, Clone, PartialEq)]
enum PipelineKind {
  Imagenet {
    labels: PathBuf,
    top: usize,
    transform: ImagenetTransform,
  },
  Binary(BinaryLabels),
}

/// 从 URL 读取流水线配置：
///
/// - `imagenet:///model.onnx?labels=/imagenet_class_index.json&size=224&preprocess=tf&top=1`
/// - `binary:///model.onnx?size=160&positive=Dog&negative=Cat&threshold=0.5`
///
/// 两种方案都接受 `layout=nhwc|nchw` 与 `filter=catmullrom|triangle|...`。
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
  model_path: PathBuf,
  kind: PipelineKind,
  size: TargetSize,
  layout: TensorLayout,
  filter: FilterType,
}

fn parse_param<T, E: fmt::Display>(
  name: &'static str,
  value: &str,
  parse: impl FnOnce(&str) -> Result<T, E>,
) -> Result<T, LoadError> {
  parse(value).map_err(|e| {
    debug!("参数 {} 解析失败: {}", name, e);
    LoadError::invalid(name, value)
  })
}

impl FromUrl for PipelineBuilder {
  type Error = LoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let mut size = None;
    let mut layout = TensorLayout::default();
    let mut filter = FilterType::CatmullRom;
    let mut labels = None;
    let mut top = 1usize;
    let mut transform = ImagenetTransform::default();
    let mut positive = DEFAULT_POSITIVE_LABEL.to_string();
    let mut negative = DEFAULT_NEGATIVE_LABEL.to_string();
    let mut threshold = crate::decode::DEFAULT_THRESHOLD;

    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "size" => size = Some(parse_param("size", &v, str::parse::<TargetSize>)?),
        "layout" => layout = parse_param("layout", &v, str::parse::<TensorLayout>)?,
        "filter" => filter = parse_param("filter", &v, parse_filter)?,
        "labels" => labels = Some(PathBuf::from(v.as_ref())),
        "top" => top = parse_param("top", &v, str::parse::<usize>)?,
        "preprocess" => transform = parse_param("preprocess", &v, str::parse::<ImagenetTransform>)?,
        "positive" => positive = v.into_owned(),
        "negative" => negative = v.into_owned(),
        "threshold" => threshold = parse_param("threshold", &v, str::parse::<f32>)?,
        _ => debug!("忽略未知参数: {}={}", k, v),
      }
    }

    let kind = match url.scheme() {
      IMAGENET_SCHEME => {
        if top == 0 {
          return Err(LoadError::invalid("top", "0"));
        }
        PipelineKind::Imagenet {
          labels: labels.ok_or(LoadError::MissingParameter("labels"))?,
          top,
          transform,
        }
      }
      BINARY_SCHEME => {
        if !(0.0..=1.0).contains(&threshold) {
          return Err(LoadError::invalid("threshold", threshold.to_string()));
        }
        PipelineKind::Binary(BinaryLabels::new(positive, negative).with_threshold(threshold))
      }
      other => {
        return Err(LoadError::SchemeMismatch(format!(
          "期望 '{}' 或 '{}', 实际 '{}'",
          IMAGENET_SCHEME, BINARY_SCHEME, other
        )));
      }
    };

    let size = size.unwrap_or(match kind {
      PipelineKind::Imagenet { .. } => IMAGENET_INPUT_SIZE,
      PipelineKind::Binary(_) => BINARY_INPUT_SIZE,
    });
    if size.width == 0 || size.height == 0 {
      return Err(LoadError::invalid("size", size.to_string()));
    }

    Ok(PipelineBuilder {
      model_path: PathBuf::from(crate::url_path(url)),
      kind,
      size,
      layout,
      filter,
    })
  }
}

impl PipelineBuilder {
  pub fn model_path(&self) -> &std::path::Path {
    &self.model_path
  }

  pub fn input_size(&self) -> TargetSize {
    self.size
  }

  pub fn layout(&self) -> TensorLayout {
    self.layout
  }

  pub fn normalizer(&self) -> Normalizer {
    let mode = match &self.kind {
      PipelineKind::Imagenet { transform, .. } => NormalizeMode::Imagenet(*transform),
      PipelineKind::Binary(_) => NormalizeMode::UnitScale,
    };
    Normalizer::new(self.size, mode).with_filter(self.filter)
  }

  /// 加载标签表等元数据并生成解码器
  pub fn decoder(&self) -> Result<Decoder, LoadError> {
    match &self.kind {
      PipelineKind::Imagenet { labels, top, .. } => {
        let vocabulary = LabelVocabulary::from_path(labels)?;
        Decoder::top_k(Arc::new(vocabulary), *top)
      }
      PipelineKind::Binary(labels) => Ok(Decoder::binary(labels.clone())),
    }
  }

  /// 使用外部提供的模型组装流水线
  pub fn build_with<M: Model>(self, model: M) -> Result<ClassificationPipeline<M>, LoadError> {
    let decoder = self.decoder()?;
    let normalizer = self.normalizer();
    info!(
      "流水线就绪: 输入 {}, 解码 {:?}",
      self.size,
      decoder.style()
    );
    Ok(ClassificationPipeline::new(model, normalizer, decoder))
  }

  #[cfg(feature = "model_onnx")]
  pub fn build(self) -> Result<ClassificationPipeline<crate::model::OnnxClassifier>, LoadError> {
    let model = crate::model::OnnxClassifierBuilder::new(&self.model_path)
      .input_size(self.size)
      .layout(self.layout)
      .build()?;
    self.build_with(model)
  }
}
