// 该文件是 Tanzhao （探照） 项目的一部分。
// src/task.rs - 任务流程
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
  sync::mpsc::Receiver,
  time::{Duration, Instant},
};

use anyhow::{Context, bail};
use tracing::{info, warn};

use crate::{
  contract::{Detection, UNKNOWN_ERROR},
  coordinator::{Coordinator, Phase, SessionConfig, SessionState},
  model::ModelBuilder,
  output::{Render, summary::top_by_score},
  payload::ImagePayload,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_TOP: usize = 3;

pub trait Task<I, B, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, builder: B, output: O) -> Result<Self::Output, Self::Error>;
}

/// 一次任务的结果：全部检测与按置信度筛选后用于展示的部分
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
  pub results: Vec<Detection>,
  pub shown: Vec<Detection>,
}

/// 加载模型、检测一张图像、渲染结果，然后结束会话
#[derive(Debug)]
pub struct OneShotTask {
  config: SessionConfig,
  top: usize,
  timeout: Option<Duration>,
  interrupt: Option<Receiver<()>>,
}

impl Default for OneShotTask {
  fn default() -> Self {
    Self::new(SessionConfig::default())
  }
}

impl OneShotTask {
  pub fn new(config: SessionConfig) -> Self {
    Self {
      config,
      top: DEFAULT_TOP,
      timeout: None,
      interrupt: None,
    }
  }

  pub fn with_top(mut self, top: usize) -> Self {
    self.top = top;
    self
  }

  /// 整个任务（加载与检测）的时间上限
  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  /// 收到消息即放弃等待
  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  fn wait_for(
    &self,
    coordinator: &mut Coordinator,
    deadline: Option<Instant>,
    what: &str,
  ) -> anyhow::Result<()> {
    let mut last_progress = None;
    loop {
      if self
        .interrupt
        .as_ref()
        .is_some_and(|rx| rx.try_recv().is_ok())
      {
        warn!("中断信号接收，放弃{}", what);
        bail!("{}被中断", what);
      }

      let state = coordinator.state();
      match state.phase() {
        Phase::Ready => return Ok(()),
        Phase::Error => bail!("{}失败: {}", what, error_of(state)),
        Phase::Loading if last_progress != Some(state.progress()) => {
          last_progress = Some(state.progress());
          info!("模型加载进度: {}%", state.progress());
        }
        _ => {}
      }

      if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
        bail!("{}超时", what);
      }
      coordinator.wait(POLL_INTERVAL)?;
    }
  }
}

fn error_of(state: &SessionState) -> &str {
  state.error_message().unwrap_or(UNKNOWN_ERROR)
}

impl<B, O, RE> Task<ImagePayload, B, O> for OneShotTask
where
  B: ModelBuilder + 'static,
  O: Render<ImagePayload, [Detection], Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Output = Outcome;
  type Error = anyhow::Error;

  fn run_task(self, input: ImagePayload, builder: B, output: O) -> Result<Outcome, Self::Error> {
    info!("开始任务...");
    let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
    let now = Instant::now();

    let mut coordinator = Coordinator::spawn(builder, self.config)?;
    self.wait_for(&mut coordinator, deadline, "模型加载")?;
    info!("模型就绪，耗时: {:.2?}", now.elapsed());

    let now = Instant::now();
    coordinator.detect(input.clone())?;
    self.wait_for(&mut coordinator, deadline, "检测")?;
    let results = coordinator.state().results().to_vec();
    info!("推理完成，{} 个结果，耗时: {:.2?}", results.len(), now.elapsed());
    coordinator.shutdown();

    let shown = top_by_score(&results, self.top);
    output
      .render_result(&input, &shown)
      .context("渲染检测结果失败")?;
    info!("渲染完成");

    Ok(Outcome { results, shown })
  }
}
