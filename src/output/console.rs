// 该文件是 Visionary （远见） 项目的一部分。
// src/output/console.rs - 控制台输出
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

use std::io::Write;

use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RawImage,
  output::{OutputError, Render},
  pipeline::Classification,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
  Stdout,
  Stderr,
}

/// 把展示文本逐行写到标准输出（`console:stdout`）或标准错误（`console:stderr`）
#[derive(Debug)]
pub struct ConsoleOutput {
  stream: Stream,
}

impl Default for ConsoleOutput {
  fn default() -> Self {
    Self {
      stream: Stream::Stdout,
    }
  }
}

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }

    let stream = match url.path().trim_matches('/') {
      "stderr" => Stream::Stderr,
      "" | "stdout" => Stream::Stdout,
      other => {
        warn!("未知的控制台输出目标 '{}', 使用标准输出", other);
        Stream::Stdout
      }
    };
    Ok(ConsoleOutput { stream })
  }
}

impl ConsoleOutput {
  fn write_to(&self, out: &mut impl Write, result: &Classification) -> std::io::Result<()> {
    writeln!(out, "{}", result)?;
    out.flush()
  }
}

impl Render<RawImage, Classification> for ConsoleOutput {
  type Error = std::io::Error;

  fn render_result(&self, _frame: &RawImage, result: &Classification) -> Result<(), Self::Error> {
    match self.stream {
      Stream::Stdout => self.write_to(&mut std::io::stdout().lock(), result),
      Stream::Stderr => self.write_to(&mut std::io::stderr().lock(), result),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decode::{ClassificationResult, ResultStyle};

  #[test]
  fn stream_selected_from_path() {
    let url = Url::parse("console:stderr").unwrap();
    assert_eq!(ConsoleOutput::from_url(&url).unwrap().stream, Stream::Stderr);
    let url = Url::parse("console://").unwrap();
    assert_eq!(ConsoleOutput::from_url(&url).unwrap().stream, Stream::Stdout);
  }

  #[test]
  fn writes_one_line_per_result() {
    let classification = Classification {
      results: vec![
        ClassificationResult::new("tabby", 0.5),
        ClassificationResult::new("lynx", 0.25),
      ],
      style: ResultStyle::WithConfidence,
    };
    let mut buffer = Vec::new();
    ConsoleOutput::default()
      .write_to(&mut buffer, &classification)
      .unwrap();
    assert_eq!(
      String::from_utf8(buffer).unwrap(),
      "tabby (50.00%)\nlynx (25.00%)\n"
    );
  }
}
