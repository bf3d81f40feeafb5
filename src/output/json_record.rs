// 该文件是 Visionary （远见） 项目的一部分。
// src/output/json_record.rs - JSON 行记录输出
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

use std::{
  fs::OpenOptions,
  io::Write,
  path::{Path, PathBuf},
};

use chrono::{SecondsFormat, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RawImage,
  output::{Render, present},
  pipeline::Classification,
};

#[derive(Error, Debug)]
pub enum JsonRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 每个结果追加一行 JSON 到文件，例如 `json:///var/log/visionary/results.jsonl`
pub struct JsonRecordOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for JsonRecordOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonRecordOutput {
  type Error = JsonRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonRecordOutputError::SchemeMismatch);
    }

    Ok(JsonRecordOutput {
      path: PathBuf::from(crate::url_path(uri)),
    })
  }
}

impl JsonRecordOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn record(&self, frame: &RawImage, result: &Classification) -> serde_json::Value {
    let results: Vec<_> = result
      .iter()
      .map(|item| {
        json!({
          "label": item.label,
          "confidence": item.confidence,
          "display": present(item, result.style),
        })
      })
      .collect();

    json!({
      "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
      "width": frame.width(),
      "height": frame.height(),
      "channels": frame.channels(),
      "results": results,
    })
  }
}

impl Render<RawImage, Classification> for JsonRecordOutput {
  type Error = JsonRecordOutputError;

  fn render_result(&self, frame: &RawImage, result: &Classification) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let line = serde_json::to_string(&self.record(frame, result))?;
    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)?;
    writeln!(file, "{}", line)?;

    info!("记录分类结果到文件: {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decode::{ClassificationResult, ResultStyle};

  #[test]
  fn appends_one_line_per_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("results.jsonl");
    let output = JsonRecordOutput::new(&path);
    let frame = RawImage::filled(4, 3, &[0, 0, 0]).unwrap();
    let classification = Classification {
      results: vec![ClassificationResult::new("Dog", 0.9)],
      style: ResultStyle::LabelOnly,
    };

    output.render_result(&frame, &classification).unwrap();
    output.render_result(&frame, &classification).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 2);

    let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(record["width"], 4);
    assert_eq!(record["height"], 3);
    assert_eq!(record["results"][0]["label"], "Dog");
    assert_eq!(record["results"][0]["display"], "Dog");
    assert!(record["timestamp"].is_string());
  }

  #[test]
  fn path_comes_from_url() {
    let url = Url::parse("json:///tmp/visionary%20out/results.jsonl").unwrap();
    let output = JsonRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), Path::new("/tmp/visionary out/results.jsonl"));
  }
}
