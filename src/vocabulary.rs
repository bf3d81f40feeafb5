// 该文件是 Visionary （远见） 项目的一部分。
// src/vocabulary.rs - 类别标签表
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

use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum VocabularyError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("标签表格式错误: {0}")]
  FormatError(String),
  #[error("标签表为空")]
  Empty,
}

/// 类别索引到类别名称的只读映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVocabulary {
  labels: Box<[String]>,
}

impl LabelVocabulary {
  pub fn new<I, S>(labels: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      labels: labels.into_iter().map(Into::into).collect(),
    }
  }

  /// 按扩展名选择解析方式：`.json` 走 JSON，其余按每行一个标签处理
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, VocabularyError> {
    let path = path.as_ref();
    info!("加载标签表: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let is_json = path
      .extension()
      .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let vocabulary = if is_json {
      Self::from_json_str(&content)?
    } else {
      Self::from_text(&content)?
    };
    debug!("标签数量: {}", vocabulary.len());
    Ok(vocabulary)
  }

  /// 每行一个标签，忽略空行
  pub fn from_text(content: &str) -> Result<Self, VocabularyError> {
    let vocabulary = Self::new(
      content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty()),
    );
    if vocabulary.is_empty() {
      return Err(VocabularyError::Empty);
    }
    Ok(vocabulary)
  }

  /// 支持两种 JSON 形式：
  ///
  /// - 名称数组：`["tench", "goldfish", ...]`
  /// - Keras 的 `imagenet_class_index.json`：`{"0": ["n01440764", "tench"], ...}`
  ///
  /// 数组元素或对象取值也可以是 `[id, name]`，此时取最后一个字符串作为名称。
  pub fn from_json_str(content: &str) -> Result<Self, VocabularyError> {
    let labels = match serde_json::from_str::<Value>(content)? {
      Value::Array(items) => items
        .iter()
        .map(label_name)
        .collect::<Result<Vec<_>, _>>()?,
      Value::Object(map) => {
        let mut indexed = map
          .iter()
          .map(|(key, value)| {
            let index = key
              .parse::<usize>()
              .map_err(|_| VocabularyError::FormatError(format!("无效的类别索引: {}", key)))?;
            Ok((index, label_name(value)?))
          })
          .collect::<Result<Vec<_>, VocabularyError>>()?;
        indexed.sort_by_key(|(index, _)| *index);

        if let Some((pos, (index, _))) = indexed
          .iter()
          .enumerate()
          .find(|(pos, (index, _))| pos != index)
        {
          return Err(VocabularyError::FormatError(format!(
            "类别索引不连续: 位置 {} 处为 {}",
            pos, index
          )));
        }
        indexed.into_iter().map(|(_, name)| name).collect()
      }
      _ => {
        return Err(VocabularyError::FormatError(
          "顶层必须是数组或对象".to_string(),
        ));
      }
    };

    if labels.is_empty() {
      return Err(VocabularyError::Empty);
    }
    Ok(Self::new(labels))
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

fn label_name(value: &Value) -> Result<String, VocabularyError> {
  match value {
    Value::String(name) => Ok(name.clone()),
    Value::Array(parts) => parts
      .iter()
      .rev()
      .find_map(Value::as_str)
      .map(str::to_string)
      .ok_or_else(|| VocabularyError::FormatError(format!("标签中没有名称: {}", value))),
    other => Err(VocabularyError::FormatError(format!(
      "无法识别的标签: {}",
      other
    ))),
  }
}
