// 该文件是 Tanzhao （探照） 项目的一部分。
// src/process.rs - 后台推理进程
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
  any::Any,
  fmt::Display,
  panic::{self, AssertUnwindSafe},
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError, SendError, Sender, TryRecvError},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use tracing::{debug, error, info, warn};

use crate::{
  contract::{Detection, MODEL_NOT_LOADED, Request, Response},
  model::{Model, ModelBuilder},
  payload::ImagePayload,
};

const PROCESS_THREAD_NAME: &str = "tanzhao-inference";

/// 独占模型实例，按到达顺序逐条处理请求。
///
/// 所有失败（包括模型代码中的 panic）都在这里转换为 `Response::Error`，
/// 不会结束后台线程。
pub struct InferenceProcess<B: ModelBuilder> {
  builder: B,
  model: Option<B::Model>,
  threshold: f32,
  outbox: Sender<Response>,
}

impl<B: ModelBuilder> InferenceProcess<B> {
  pub fn new(builder: B, threshold: f32, outbox: Sender<Response>) -> Self {
    Self {
      builder,
      model: None,
      threshold,
      outbox,
    }
  }

  pub fn is_ready(&self) -> bool {
    self.model.is_some()
  }

  pub fn handle(&mut self, request: Request) {
    match request {
      Request::LoadModel => self.load_model(),
      Request::Detect { image_data } => self.detect(&image_data),
    }
  }

  /// 阻塞地接收请求直到通道关闭或会话结束
  pub fn run(mut self, inbox: Receiver<Request>, terminated: Arc<AtomicBool>) {
    info!("推理进程已启动");
    while let Ok(request) = inbox.recv() {
      if terminated.load(Ordering::Acquire) {
        debug!("会话已结束，丢弃剩余请求");
        break;
      }
      self.handle(request);
    }
    info!("推理进程退出");
  }

  fn emit(&self, response: Response) {
    if self.outbox.send(response).is_err() {
      debug!("协调器已关闭，丢弃消息");
    }
  }

  fn load_model(&mut self) {
    if self.model.is_some() {
      debug!("模型已加载，忽略重复的加载请求");
      return;
    }

    info!("开始加载模型...");
    self.emit(Response::LoadProgress { progress: 0 });

    let outbox = self.outbox.clone();
    let mut last_progress = 0u8;
    let mut on_progress = |value: f32| {
      let progress = round_percent(value);
      if progress > last_progress {
        last_progress = progress;
        let _ = outbox.send(Response::LoadProgress { progress });
      }
    };

    let now = Instant::now();
    let builder = &mut self.builder;
    match catch_fault(|| builder.build(&mut on_progress)) {
      Ok(model) => {
        info!("模型加载完成，耗时: {:.2?}", now.elapsed());
        self.model = Some(model);
        self.emit(Response::ModelReady);
      }
      Err(cause) => {
        error!("模型加载失败: {}", cause);
        self.emit(Response::error(format!("Failed to load model: {cause}")));
      }
    }
  }

  fn detect(&mut self, image: &ImagePayload) {
    let Some(model) = self.model.as_ref() else {
      warn!("模型尚未加载，拒绝推理请求");
      self.emit(Response::error(MODEL_NOT_LOADED));
      return;
    };

    debug!("开始推理: {:?}", image);
    let threshold = self.threshold;
    let now = Instant::now();
    match catch_fault(|| model.infer(image, threshold)) {
      Ok(raw) => {
        let results: Vec<Detection> = raw
          .into_vec()
          .into_iter()
          .map(Detection::normalized)
          .collect();
        info!(
          "推理完成，检测到 {} 个对象，耗时: {:.2?}",
          results.len(),
          now.elapsed()
        );
        self.emit(Response::DetectionResult { results });
      }
      Err(cause) => {
        error!("推理失败: {}", cause);
        self.emit(Response::error(format!("Detection failed: {cause}")));
      }
    }
  }
}

fn round_percent(value: f32) -> u8 {
  value.clamp(0.0, 100.0).round() as u8
}

fn catch_fault<T, E: Display>(f: impl FnOnce() -> Result<T, E>) -> Result<T, String> {
  match panic::catch_unwind(AssertUnwindSafe(f)) {
    Ok(Ok(value)) => Ok(value),
    Ok(Err(err)) => Err(err.to_string()),
    Err(payload) => Err(panic_message(payload.as_ref())),
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "panic in model code".to_string()
  }
}

/// 协调器持有的推理进程句柄：两个方向各一条 FIFO 通道
pub struct ProcessHandle {
  requests: Sender<Request>,
  responses: Receiver<Response>,
  terminated: Arc<AtomicBool>,
  thread: JoinHandle<()>,
}

/// 在独立线程中启动推理进程
pub fn spawn<B>(builder: B, threshold: f32) -> std::io::Result<ProcessHandle>
where
  B: ModelBuilder + 'static,
{
  let (requests, inbox) = mpsc::channel();
  let (outbox, responses) = mpsc::channel();
  let terminated = Arc::new(AtomicBool::new(false));

  let flag = terminated.clone();
  let thread = thread::Builder::new()
    .name(PROCESS_THREAD_NAME.to_string())
    .spawn(move || InferenceProcess::new(builder, threshold, outbox).run(inbox, flag))?;

  Ok(ProcessHandle {
    requests,
    responses,
    terminated,
    thread,
  })
}

impl ProcessHandle {
  pub fn send(&self, request: Request) -> Result<(), SendError<Request>> {
    self.requests.send(request)
  }

  pub fn try_recv(&self) -> Result<Response, TryRecvError> {
    self.responses.try_recv()
  }

  pub fn recv_timeout(&self, timeout: Duration) -> Result<Response, RecvTimeoutError> {
    self.responses.recv_timeout(timeout)
  }

  pub fn is_finished(&self) -> bool {
    self.thread.is_finished()
  }

  /// 结束会话：未开始的请求被丢弃，通道关闭。
  ///
  /// 不等待线程退出，正在进行的模型调用结束后线程自行退出。
  pub fn terminate(self) {
    self.terminated.store(true, Ordering::Release);
    drop(self.requests);
    drop(self.responses);
    debug!("推理进程已分离: {:?}", self.thread.thread().name());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{contract::BoundingBox, model::RawDetections};
  use std::sync::atomic::AtomicUsize;

  struct ScriptedModel {
    detections: Vec<Detection>,
  }

  impl Model for ScriptedModel {
    type Error = std::io::Error;

    fn infer(&self, image: &ImagePayload, _threshold: f32) -> Result<RawDetections, Self::Error> {
      match image.mime() {
        "image/x-panic" => panic!("boom"),
        "image/x-fail" => Err(std::io::Error::other("bad image")),
        "image/x-single" => Ok(RawDetections::Single(self.detections[0].clone())),
        _ => Ok(RawDetections::Many(self.detections.clone())),
      }
    }
  }

  struct ScriptedBuilder {
    attempts: Arc<AtomicUsize>,
    failures: usize,
    steps: Vec<f32>,
  }

  impl ScriptedBuilder {
    fn new(failures: usize) -> (Self, Arc<AtomicUsize>) {
      let attempts = Arc::new(AtomicUsize::new(0));
      let builder = Self {
        attempts: attempts.clone(),
        failures,
        steps: vec![10.2, 10.4, 55.0, 40.0, 100.0],
      };
      (builder, attempts)
    }
  }

  impl ModelBuilder for ScriptedBuilder {
    type Model = ScriptedModel;
    type Error = std::io::Error;

    fn build(&mut self, progress: &mut dyn FnMut(f32)) -> Result<Self::Model, Self::Error> {
      let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
      for step in &self.steps {
        progress(*step);
      }
      if attempt <= self.failures {
        return Err(std::io::Error::other("network down"));
      }
      Ok(ScriptedModel {
        detections: vec![Detection::new(
          "cat",
          0.87,
          BoundingBox::from_corners(100.0, 200.0, 400.0, 600.0),
        )],
      })
    }
  }

  fn payload(mime: &str) -> ImagePayload {
    ImagePayload::from_bytes(mime, b"pixels")
  }

  fn drain(rx: &Receiver<Response>) -> Vec<Response> {
    rx.try_iter().collect()
  }

  #[test]
  fn detect_before_load_reports_not_loaded() {
    let (builder, attempts) = ScriptedBuilder::new(0);
    let (tx, rx) = mpsc::channel();
    let mut process = InferenceProcess::new(builder, 0.3, tx);

    process.handle(Request::Detect {
      image_data: payload("image/png"),
    });

    assert_eq!(drain(&rx), vec![Response::error(MODEL_NOT_LOADED)]);
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn load_emits_monotonic_progress_then_ready() {
    let (builder, _) = ScriptedBuilder::new(0);
    let (tx, rx) = mpsc::channel();
    let mut process = InferenceProcess::new(builder, 0.3, tx);

    process.handle(Request::LoadModel);

    assert_eq!(
      drain(&rx),
      vec![
        Response::LoadProgress { progress: 0 },
        Response::LoadProgress { progress: 10 },
        Response::LoadProgress { progress: 55 },
        Response::LoadProgress { progress: 100 },
        Response::ModelReady,
      ]
    );
    assert!(process.is_ready());
  }

  #[test]
  fn repeated_load_is_idempotent() {
    let (builder, attempts) = ScriptedBuilder::new(0);
    let (tx, rx) = mpsc::channel();
    let mut process = InferenceProcess::new(builder, 0.3, tx);

    process.handle(Request::LoadModel);
    process.handle(Request::LoadModel);

    let ready = drain(&rx)
      .into_iter()
      .filter(|r| *r == Response::ModelReady)
      .count();
    assert_eq!(ready, 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn failed_load_can_be_retried() {
    let (builder, attempts) = ScriptedBuilder::new(1);
    let (tx, rx) = mpsc::channel();
    let mut process = InferenceProcess::new(builder, 0.3, tx);

    process.handle(Request::LoadModel);
    let first = drain(&rx);
    assert_eq!(
      first.last(),
      Some(&Response::error("Failed to load model: network down"))
    );
    assert!(!first.contains(&Response::ModelReady));
    assert!(!process.is_ready());

    process.handle(Request::LoadModel);
    assert_eq!(drain(&rx).last(), Some(&Response::ModelReady));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn inference_failures_keep_model_loaded() {
    let (builder, _) = ScriptedBuilder::new(0);
    let (tx, rx) = mpsc::channel();
    let mut process = InferenceProcess::new(builder, 0.3, tx);
    process.handle(Request::LoadModel);
    drain(&rx);

    process.handle(Request::Detect {
      image_data: payload("image/x-fail"),
    });
    assert_eq!(
      drain(&rx),
      vec![Response::error("Detection failed: bad image")]
    );

    process.handle(Request::Detect {
      image_data: payload("image/x-panic"),
    });
    assert_eq!(drain(&rx), vec![Response::error("Detection failed: boom")]);

    process.handle(Request::Detect {
      image_data: payload("image/png"),
    });
    match drain(&rx).as_slice() {
      [Response::DetectionResult { results }] => assert_eq!(results[0].label, "cat"),
      other => panic!("unexpected responses: {other:?}"),
    }
  }

  #[test]
  fn single_record_output_becomes_a_list() {
    let (builder, _) = ScriptedBuilder::new(0);
    let (tx, rx) = mpsc::channel();
    let mut process = InferenceProcess::new(builder, 0.3, tx);
    process.handle(Request::LoadModel);
    drain(&rx);

    process.handle(Request::Detect {
      image_data: payload("image/x-single"),
    });
    match drain(&rx).as_slice() {
      [Response::DetectionResult { results }] => assert_eq!(results.len(), 1),
      other => panic!("unexpected responses: {other:?}"),
    }
  }

  #[test]
  fn spawned_process_answers_in_arrival_order() {
    let (builder, _) = ScriptedBuilder::new(0);
    let handle = spawn(builder, 0.3).unwrap();
    handle.send(Request::LoadModel).unwrap();
    handle
      .send(Request::Detect {
        image_data: payload("image/png"),
      })
      .unwrap();

    let mut responses = Vec::new();
    while !matches!(responses.last(), Some(Response::DetectionResult { .. })) {
      responses.push(handle.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    let ready_at = responses.iter().position(|r| *r == Response::ModelReady);
    assert_eq!(ready_at, Some(responses.len() - 2));
    handle.terminate();
  }
}
