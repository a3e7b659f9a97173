// 该文件是 Yanjing （眼睛） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::convert::Infallible;

use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::DetectResult, output::Render};

/// `stdout:`，把检测结果写入日志
#[derive(Debug, Default)]
pub struct LogOutput {
  skip_empty: bool,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for LogOutput {
  type Error = Infallible;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let skip_empty = url.query_pairs().any(|(k, _)| k == "skip_empty");
    Ok(LogOutput { skip_empty })
  }
}

impl<F> Render<F, DetectResult> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, _frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    if result.is_empty() {
      if !self.skip_empty {
        info!("未检测到物体");
      }
      return Ok(());
    }

    info!("检测到 {} 个物体", result.len());
    for item in result.iter() {
      info!(
        "  - {}: {:.2}% at ({:.3}, {:.3}, {:.3}x{:.3})",
        item.label,
        item.confidence * 100.0,
        item.center_x,
        item.center_y,
        item.width,
        item.height
      );
    }
    Ok(())
  }
}
