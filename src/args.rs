// 该文件是 Tanzhao （探照） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

use tanzhao::{
  coordinator::{DetectGate, SessionConfig},
  model::DEFAULT_THRESHOLD,
};

/// Tanzhao 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型来源，例如 replay:///path/to/detections.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入图像，例如 image:///path/to/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出路径，例如 image:///tmp/out.png；不指定时只打印结果
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 显示区域宽度（与高度一起给出时图像按比例缩小放入）
  #[arg(long, value_name = "PIXELS", requires = "display_height")]
  pub display_width: Option<u32>,

  /// 显示区域高度
  #[arg(long, value_name = "PIXELS", requires = "display_width")]
  pub display_height: Option<u32>,

  /// 展示置信度最高的前 N 个结果
  #[arg(long, default_value_t = 3, value_name = "COUNT")]
  pub top: usize,

  /// 标签字体文件（TTF/OTF）；不指定时不绘制标签文字
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 置信度阈值 (0.0 - 1.0)
  ///
  /// 默认 0.3。其他取值会偏离默认的检测约定，仅用于调试或离线比对。
  #[arg(long, default_value_t = DEFAULT_THRESHOLD, value_name = "THRESHOLD")]
  pub threshold: f32,

  /// 模型未就绪时也转发检测请求
  #[arg(long)]
  pub permissive: bool,

  /// 以 JSON 打印完整检测结果
  #[arg(long)]
  pub json: bool,

  /// 整个任务的超时时间（秒）
  #[arg(long, value_name = "SECONDS")]
  pub timeout_secs: Option<u64>,
}

impl Args {
  pub fn session_config(&self) -> SessionConfig {
    SessionConfig {
      threshold: self.threshold,
      gate: if self.permissive {
        DetectGate::Permissive
      } else {
        DetectGate::Strict
      },
    }
  }

  pub fn display_size(&self) -> Option<(u32, u32)> {
    self.display_width.zip(self.display_height)
  }
}
