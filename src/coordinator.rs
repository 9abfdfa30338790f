// 该文件是 Tanzhao （探照） 项目的一部分。
// src/coordinator.rs - 推理协调器与会话状态机
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
  fmt,
  sync::mpsc::{RecvTimeoutError, TryRecvError},
  time::Duration,
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  contract::{Detection, Request, Response, UNKNOWN_ERROR},
  model::{DEFAULT_THRESHOLD, ModelBuilder},
  payload::ImagePayload,
  process::{self, ProcessHandle},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
  #[default]
  Idle,
  Loading,
  Ready,
  Detecting,
  Error,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Phase::Idle => "Idle",
      Phase::Loading => "Loading",
      Phase::Ready => "Ready",
      Phase::Detecting => "Detecting",
      Phase::Error => "Error",
    };
    f.write_str(name)
  }
}

/// `detect()` 在非就绪阶段被调用时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectGate {
  /// 只在 `Ready` 或 `Error` 阶段接受检测请求
  #[default]
  Strict,
  /// 任何阶段都直接转发给推理进程
  Permissive,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
  pub threshold: f32,
  pub gate: DetectGate,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      threshold: DEFAULT_THRESHOLD,
      gate: DetectGate::default(),
    }
  }
}

/// 会话状态，只由协调器根据通道消息修改
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
  phase: Phase,
  progress: u8,
  results: Vec<Detection>,
  error_message: Option<String>,
  model_ready: bool,
}

impl SessionState {
  pub fn phase(&self) -> Phase {
    self.phase
  }

  /// 加载进度 0-100，仅在 `Loading` 阶段有意义
  pub fn progress(&self) -> u8 {
    self.progress
  }

  pub fn results(&self) -> &[Detection] {
    &self.results
  }

  pub fn error_message(&self) -> Option<&str> {
    self.error_message.as_deref()
  }

  pub fn is_model_ready(&self) -> bool {
    self.model_ready
  }

  pub fn is_loading(&self) -> bool {
    self.phase == Phase::Loading
  }

  pub fn is_detecting(&self) -> bool {
    self.phase == Phase::Detecting
  }

  /// 已发出 `LoadModel`
  pub fn begin_loading(&mut self) {
    self.phase = Phase::Loading;
    self.progress = 0;
  }

  /// 已发出 `Detect`：清空上一轮结果与错误
  pub fn begin_detect(&mut self) {
    self.phase = Phase::Detecting;
    self.results.clear();
    self.error_message = None;
  }

  pub fn apply(&mut self, response: Response) {
    match response {
      Response::LoadProgress { progress } => {
        self.progress = progress.min(100);
        if matches!(self.phase, Phase::Idle | Phase::Loading) {
          self.phase = Phase::Loading;
        }
      }
      Response::ModelReady => {
        self.model_ready = true;
        self.progress = 100;
        if matches!(self.phase, Phase::Idle | Phase::Loading) {
          self.phase = Phase::Ready;
        }
      }
      Response::DetectionResult { results } => {
        self.results = results;
        self.phase = Phase::Ready;
      }
      Response::Error { message } => {
        self.error_message = Some(if message.is_empty() {
          UNKNOWN_ERROR.to_string()
        } else {
          message
        });
        self.phase = Phase::Error;
      }
    }
  }
}

#[derive(Error, Debug)]
pub enum CoordinatorError {
  #[error("无法启动推理进程: {0}")]
  Spawn(#[from] std::io::Error),
  #[error("当前阶段 {0} 不接受检测请求")]
  NotReady(Phase),
  #[error("会话已结束")]
  Terminated,
}

/// 前台协调器：唯一持有推理进程与消息通道的组件
pub struct Coordinator {
  process: Option<ProcessHandle>,
  state: SessionState,
  gate: DetectGate,
}

impl Coordinator {
  /// 启动推理进程并立即请求加载模型
  pub fn spawn<B>(builder: B, config: SessionConfig) -> Result<Self, CoordinatorError>
  where
    B: ModelBuilder + 'static,
  {
    info!(
      "启动推理会话，阈值: {}, 请求门控: {:?}",
      config.threshold, config.gate
    );
    let process = process::spawn(builder, config.threshold)?;
    let mut coordinator = Self {
      process: Some(process),
      state: SessionState::default(),
      gate: config.gate,
    };
    coordinator.send(Request::LoadModel)?;
    coordinator.state.begin_loading();
    Ok(coordinator)
  }

  pub fn state(&self) -> &SessionState {
    &self.state
  }

  pub fn is_terminated(&self) -> bool {
    self.process.is_none()
  }

  pub fn detect(&mut self, image: ImagePayload) -> Result<(), CoordinatorError> {
    if self.process.is_none() {
      return Err(CoordinatorError::Terminated);
    }
    let phase = self.state.phase();
    if self.gate == DetectGate::Strict && !matches!(phase, Phase::Ready | Phase::Error) {
      warn!("阶段 {} 下拒绝检测请求", phase);
      return Err(CoordinatorError::NotReady(phase));
    }

    self.send(Request::Detect { image_data: image })?;
    self.state.begin_detect();
    debug!("已发送检测请求");
    Ok(())
  }

  /// 模型未就绪时重新请求加载，已就绪或正在加载时不做任何事
  pub fn reload(&mut self) -> Result<(), CoordinatorError> {
    if self.state.is_model_ready() || self.state.is_loading() {
      debug!("模型已就绪或正在加载，忽略重新加载");
      return Ok(());
    }
    info!("重新加载模型");
    self.send(Request::LoadModel)?;
    self.state.begin_loading();
    Ok(())
  }

  /// 非阻塞地应用所有已到达的消息，返回应用的条数
  pub fn pump(&mut self) -> usize {
    let mut applied = 0;
    while let Some(process) = self.process.as_ref() {
      match process.try_recv() {
        Ok(response) => {
          self.state.apply(response);
          applied += 1;
        }
        Err(TryRecvError::Empty) => break,
        Err(TryRecvError::Disconnected) => {
          warn!("推理进程意外退出");
          break;
        }
      }
    }
    applied
  }

  /// 最多等待 `timeout`，有消息到达则应用并返回 true
  pub fn wait(&mut self, timeout: Duration) -> Result<bool, CoordinatorError> {
    let process = self.process.as_ref().ok_or(CoordinatorError::Terminated)?;
    match process.recv_timeout(timeout) {
      Ok(response) => {
        self.state.apply(response);
        self.pump();
        Ok(true)
      }
      Err(RecvTimeoutError::Timeout) => Ok(false),
      Err(RecvTimeoutError::Disconnected) => Err(CoordinatorError::Terminated),
    }
  }

  /// 结束会话，之后的调用返回 `CoordinatorError::Terminated`
  pub fn shutdown(mut self) {
    self.teardown();
  }

  fn send(&mut self, request: Request) -> Result<(), CoordinatorError> {
    let process = self.process.as_ref().ok_or(CoordinatorError::Terminated)?;
    process
      .send(request)
      .map_err(|_| CoordinatorError::Terminated)
  }

  fn teardown(&mut self) {
    if let Some(process) = self.process.take() {
      process.terminate();
      info!("推理会话已结束");
    }
  }
}

impl Drop for Coordinator {
  fn drop(&mut self) {
    self.teardown();
  }
}
