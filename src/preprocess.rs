// 该文件是 Visionary （远见） 项目的一部分。
// src/preprocess.rs - 图像归一化
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

use std::{fmt, str::FromStr};

use image::{RgbImage, imageops::FilterType};
use tracing::{debug, error};

use crate::{
  error::PipelineError,
  frame::{NormalizedTensor, RGB_CHANNELS, RGBA_CHANNELS, RawImage},
};

const CAFFE_BGR_MEAN: [f32; 3] = [103.939, 116.779, 123.68];
const TORCH_RGB_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const TORCH_RGB_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 模型输入尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
  pub width: u32,
  pub height: u32,
}

impl TargetSize {
  pub const fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  pub const fn square(side: u32) -> Self {
    Self::new(side, side)
  }
}

impl fmt::Display for TargetSize {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}x{}", self.width, self.height)
  }
}

/// 接受 `224` 或 `320x240`（宽x高）
impl FromStr for TargetSize {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let parse = |v: &str| {
      v.trim()
        .parse::<u32>()
        .map_err(|e| format!("无法解析尺寸 '{}': {}", s, e))
    };
    match s.split_once(['x', 'X']) {
      Some((w, h)) => Ok(TargetSize::new(parse(w)?, parse(h)?)),
      None => Ok(TargetSize::square(parse(s)?)),
    }
  }
}

/// ImageNet 预训练模型常见的三种预处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImagenetTransform {
  /// `x / 127.5 - 1`，MobileNetV2 使用
  #[default]
  Tf,
  /// RGB 转 BGR 后减去各通道均值
  Caffe,
  /// 缩放到 [0, 1] 后按均值方差标准化
  Torch,
}

impl ImagenetTransform {
  fn apply(self, pixel: &[u8], out: &mut Vec<f32>) {
    match self {
      ImagenetTransform::Tf => {
        out.extend(pixel.iter().map(|&v| v as f32 / 127.5 - 1.0));
      }
      ImagenetTransform::Caffe => {
        for c in 0..RGB_CHANNELS {
          out.push(pixel[RGB_CHANNELS - 1 - c] as f32 - CAFFE_BGR_MEAN[c]);
        }
      }
      ImagenetTransform::Torch => {
        for c in 0..RGB_CHANNELS {
          out.push((pixel[c] as f32 / 255.0 - TORCH_RGB_MEAN[c]) / TORCH_RGB_STD[c]);
        }
      }
    }
  }
}

impl FromStr for ImagenetTransform {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "tf" => Ok(ImagenetTransform::Tf),
      "caffe" => Ok(ImagenetTransform::Caffe),
      "torch" => Ok(ImagenetTransform::Torch),
      other => Err(format!("未知的预处理方式: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
  Imagenet(ImagenetTransform),
  /// `[0, 255]` 线性映射到 `[0.0, 1.0]`
  UnitScale,
}

impl NormalizeMode {
  fn write_pixel(self, pixel: &[u8], out: &mut Vec<f32>) {
    match self {
      NormalizeMode::Imagenet(transform) => transform.apply(pixel, out),
      NormalizeMode::UnitScale => out.extend(pixel.iter().map(|&v| v as f32 / 255.0)),
    }
  }
}

/// 解析重采样滤波器名称
pub fn parse_filter(name: &str) -> Result<FilterType, String> {
  match name.to_ascii_lowercase().as_str() {
    "nearest" => Ok(FilterType::Nearest),
    "triangle" | "bilinear" => Ok(FilterType::Triangle),
    "catmullrom" | "bicubic" => Ok(FilterType::CatmullRom),
    "gaussian" => Ok(FilterType::Gaussian),
    "lanczos3" | "lanczos" => Ok(FilterType::Lanczos3),
    other => Err(format!("未知的重采样滤波器: {}", other)),
  }
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
  target: TargetSize,
  mode: NormalizeMode,
  filter: FilterType,
}

impl Normalizer {
  pub fn new(target: TargetSize, mode: NormalizeMode) -> Self {
    Self {
      target,
      mode,
      filter: FilterType::CatmullRom,
    }
  }

  pub fn with_filter(mut self, filter: FilterType) -> Self {
    self.filter = filter;
    self
  }

  pub fn target(&self) -> TargetSize {
    self.target
  }

  pub fn mode(&self) -> NormalizeMode {
    self.mode
  }

  pub fn normalize(&self, image: &RawImage) -> Result<NormalizedTensor, PipelineError> {
    let channels = image.channels() as usize;
    if channels != RGB_CHANNELS && channels != RGBA_CHANNELS {
      error!("不支持的通道数: {}", channels);
      return Err(PipelineError::UnsupportedChannelCount(image.channels()));
    }

    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
      error!("图像尺寸无效: {}x{}", width, height);
      return Err(PipelineError::InvalidDimensions { width, height });
    }

    let TargetSize {
      width: target_w,
      height: target_h,
    } = self.target;
    if target_w == 0 || target_h == 0 {
      error!("目标尺寸无效: {}", self.target);
      return Err(PipelineError::InvalidDimensions {
        width: target_w,
        height: target_h,
      });
    }

    // 先丢弃 alpha 再缩放，保证结果与预先去掉 alpha 的图像一致
    let rgb = image.without_alpha()?;
    let actual = rgb.as_raw().len();
    let rgb = RgbImage::from_raw(width, height, rgb.into_raw()).ok_or(
      PipelineError::PixelBufferMismatch {
        expected: width as usize * height as usize * RGB_CHANNELS,
        actual,
      },
    )?;

    let resized = if (width, height) == (target_w, target_h) {
      rgb
    } else {
      debug!(
        "缩放图像: {}x{} -> {} ({:?})",
        width, height, self.target, self.filter
      );
      image::imageops::resize(&rgb, target_w, target_h, self.filter)
    };

    let mut data = Vec::with_capacity(target_w as usize * target_h as usize * RGB_CHANNELS);
    for pixel in resized.as_raw().chunks_exact(RGB_CHANNELS) {
      self.mode.write_pixel(pixel, &mut data);
    }

    NormalizedTensor::from_nhwc(target_w as usize, target_h as usize, data)
  }
}

pub fn normalize(
  image: &RawImage,
  target: TargetSize,
  mode: NormalizeMode,
) -> Result<NormalizedTensor, PipelineError> {
  Normalizer::new(target, mode).normalize(image)
}
