// 该文件是 Visionary （远见） 项目的一部分。
// src/frame.rs - 原始图像与归一化张量定义
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

use std::str::FromStr;

use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};

use crate::error::PipelineError;

pub const RGB_CHANNELS: usize = 3;
pub const RGBA_CHANNELS: usize = 4;

/// 解码后的位图，按行交错存储 u8 采样
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
  width: u32,
  height: u32,
  channels: u8,
  data: Box<[u8]>,
}

impl RawImage {
  pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, PipelineError> {
    let expected = width as usize * height as usize * channels as usize;
    if data.len() != expected {
      return Err(PipelineError::PixelBufferMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      channels,
      data: data.into_boxed_slice(),
    })
  }

  /// 单一颜色填充的图像
  pub fn filled(width: u32, height: u32, pixel: &[u8]) -> Result<Self, PipelineError> {
    let count = width as usize * height as usize;
    let channels = u8::try_from(pixel.len()).map_err(|_| PipelineError::PixelBufferMismatch {
      expected: count * u8::MAX as usize,
      actual: count * pixel.len(),
    })?;
    Self::new(width, height, channels, pixel.repeat(count))
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> u8 {
    self.channels
  }

  pub fn as_raw(&self) -> &[u8] {
    &self.data
  }

  pub fn into_raw(self) -> Vec<u8> {
    self.data.into_vec()
  }

  pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
    if x >= self.width || y >= self.height {
      return None;
    }
    let channels = self.channels as usize;
    let start = (y as usize * self.width as usize + x as usize) * channels;
    self.data.get(start..start + channels)
  }

  /// 去掉 alpha 通道后的副本，其余通道保持不变
  pub fn without_alpha(&self) -> Result<Self, PipelineError> {
    match self.channels as usize {
      RGB_CHANNELS => Ok(self.clone()),
      RGBA_CHANNELS => {
        let data: Vec<u8> = self
          .data
          .chunks_exact(RGBA_CHANNELS)
          .flat_map(|pixel| pixel[..RGB_CHANNELS].iter().copied())
          .collect();
        RawImage::new(self.width, self.height, RGB_CHANNELS as u8, data)
      }
      _ => Err(PipelineError::UnsupportedChannelCount(self.channels)),
    }
  }
}

impl From<RgbImage> for RawImage {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      channels: RGB_CHANNELS as u8,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

impl From<RgbaImage> for RawImage {
  fn from(image: RgbaImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      channels: RGBA_CHANNELS as u8,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

impl From<GrayImage> for RawImage {
  fn from(image: GrayImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      channels: 1,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

impl From<GrayAlphaImage> for RawImage {
  fn from(image: GrayAlphaImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      channels: 2,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

// 保留原图的通道数，灰度图不会被偷偷转换成 RGB
impl From<DynamicImage> for RawImage {
  fn from(image: DynamicImage) -> Self {
    let color = image.color();
    match (color.has_color(), color.has_alpha()) {
      (true, true) => image.into_rgba8().into(),
      (true, false) => image.into_rgb8().into(),
      (false, true) => image.into_luma_alpha8().into(),
      (false, false) => image.into_luma8().into(),
    }
  }
}

/// 张量在内存中的排布
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TensorLayout {
  #[default]
  Nhwc,
  Nchw,
}

impl FromStr for TensorLayout {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "nhwc" => Ok(TensorLayout::Nhwc),
      "nchw" => Ok(TensorLayout::Nchw),
      other => Err(format!("未知的张量排布: {}", other)),
    }
  }
}

/// 形状固定为 (1, H, W, 3) 的通道在后浮点张量
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
  width: usize,
  height: usize,
  data: Box<[f32]>,
}

impl NormalizedTensor {
  pub fn from_nhwc(width: usize, height: usize, data: Vec<f32>) -> Result<Self, PipelineError> {
    let expected = width * height * RGB_CHANNELS;
    if data.len() != expected {
      return Err(PipelineError::PixelBufferMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, self.height, self.width, RGB_CHANNELS]
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn into_vec(self) -> Vec<f32> {
    self.data.into_vec()
  }

  pub fn get(&self, y: usize, x: usize, c: usize) -> Option<f32> {
    if y >= self.height || x >= self.width || c >= RGB_CHANNELS {
      return None;
    }
    self
      .data
      .get((y * self.width + x) * RGB_CHANNELS + c)
      .copied()
  }

  /// 转成 NCHW 排布的数据副本
  pub fn to_nchw(&self) -> Vec<f32> {
    let plane = self.width * self.height;
    let mut out = vec![0.0f32; self.data.len()];
    for (idx, pixel) in self.data.chunks_exact(RGB_CHANNELS).enumerate() {
      for (c, value) in pixel.iter().enumerate() {
        out[c * plane + idx] = *value;
      }
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn raw_image_rejects_short_buffer() {
    let err = RawImage::new(2, 2, 3, vec![0; 11]).unwrap_err();
    assert!(matches!(
      err,
      PipelineError::PixelBufferMismatch {
        expected: 12,
        actual: 11
      }
    ));
  }

  #[test]
  fn filled_rejects_oversized_pixel() {
    let err = RawImage::filled(2, 2, &[7; 256]).unwrap_err();
    assert!(matches!(
      err,
      PipelineError::PixelBufferMismatch {
        expected: 1020,
        actual: 1024
      }
    ));

    let image = RawImage::filled(2, 2, &[1, 2, 3, 4]).unwrap();
    assert_eq!(image.channels(), 4);
    assert_eq!(image.as_raw().len(), 16);
  }

  #[test]
  fn without_alpha_keeps_color_channels() {
    let image = RawImage::new(2, 1, 4, vec![1, 2, 3, 200, 4, 5, 6, 0]).unwrap();
    let rgb = image.without_alpha().unwrap();
    assert_eq!(rgb.channels(), 3);
    assert_eq!(rgb.as_raw(), &[1, 2, 3, 4, 5, 6]);
  }

  #[test]
  fn dynamic_gray_image_keeps_single_channel() {
    let image = DynamicImage::ImageLuma8(GrayImage::new(3, 2));
    let raw = RawImage::from(image);
    assert_eq!(raw.channels(), 1);
    assert_eq!(raw.as_raw().len(), 6);
  }

  #[test]
  fn pixel_lookup_is_row_major() {
    let image = RawImage::new(2, 2, 3, (0..12).collect()).unwrap();
    assert_eq!(image.pixel(1, 1), Some(&[9u8, 10, 11][..]));
    assert_eq!(image.pixel(2, 0), None);
  }

  #[test]
  fn nchw_transpose_groups_planes() {
    let tensor = NormalizedTensor::from_nhwc(2, 1, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]).unwrap();
    assert_eq!(tensor.shape(), [1, 1, 2, 3]);
    assert_eq!(tensor.to_nchw(), vec![0.1, 0.4, 0.2, 0.5, 0.3, 0.6]);
    assert_eq!(tensor.get(0, 1, 2), Some(0.6));
  }

  #[test]
  fn layout_parses_case_insensitively() {
    assert_eq!("NCHW".parse::<TensorLayout>(), Ok(TensorLayout::Nchw));
    assert!("hwc".parse::<TensorLayout>().is_err());
  }
}
