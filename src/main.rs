// 该文件是 Tanzhao （探照） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{sync::mpsc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tanzhao::{
  FromUrl,
  contract::Response,
  input::ImageFileInput,
  model::ReplayModelBuilder,
  output::{SaveImageFileOutput, overlay::load_font, summary::results_panel},
  task::{OneShotTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();

  info!("模型来源: {}", args.model);
  info!("输入来源: {}", args.input);
  if let Some(output) = &args.output {
    info!("输出路径: {}", output);
  }
  info!("置信度阈值: {}", args.threshold);

  let builder = ReplayModelBuilder::from_url(&args.model).context("无法解析模型来源")?;
  let input = ImageFileInput::from_url(&args.input).context("无法读取输入图像")?;
  info!("输入图像: {} ({:?})", input.path().display(), input.format());

  let output = match &args.output {
    Some(url) => {
      let mut output = SaveImageFileOutput::from_url(url).context("无法解析输出路径")?;
      if let Some((width, height)) = args.display_size() {
        output = output.with_container(width, height);
      }
      if let Some(font) = &args.font {
        let font =
          load_font(font).with_context(|| format!("无法加载字体 {}", font.display()))?;
        output = output.with_font(font);
      }
      Some(output)
    }
    None => None,
  };

  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
  })
  .context("无法设置 Ctrl-C 处理函数")?;

  let task = OneShotTask::new(args.session_config())
    .with_top(args.top)
    .with_timeout(args.timeout_secs.map(Duration::from_secs))
    .with_interrupt(rx);
  let outcome = task.run_task(input.into_payload(), builder, output)?;

  for line in results_panel(&outcome.shown, false) {
    println!("{line}");
  }
  if args.json {
    let response = Response::DetectionResult {
      results: outcome.results,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
  }

  Ok(())
}
