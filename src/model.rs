// 该文件是 Tanzhao （探照） 项目的一部分。
// src/model.rs - 模型能力接口
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

use serde::Deserialize;

use crate::{contract::Detection, payload::ImagePayload};

/// 推理时使用的置信度阈值
pub const DEFAULT_THRESHOLD: f32 = 0.3;

/// 已加载、可推理的模型
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, image: &ImagePayload, threshold: f32) -> Result<RawDetections, Self::Error>;
}

/// 一次性的模型获取步骤。`progress` 以 0-100 的数值回调。
///
/// 失败后可以再次调用 `build` 重试，失败时不得保留半成品模型。
pub trait ModelBuilder: Send {
  type Model: Model;
  type Error: std::error::Error + Send + Sync + 'static;

  fn build(&mut self, progress: &mut dyn FnMut(f32)) -> Result<Self::Model, Self::Error>;
}

/// 模型原始输出：单目标图像可能只返回一条记录
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawDetections {
  Many(Vec<Detection>),
  Single(Detection),
}

impl RawDetections {
  pub fn into_vec(self) -> Vec<Detection> {
    match self {
      RawDetections::Many(items) => items,
      RawDetections::Single(item) => vec![item],
    }
  }
}

impl From<Vec<Detection>> for RawDetections {
  fn from(items: Vec<Detection>) -> Self {
    RawDetections::Many(items)
  }
}

impl From<Detection> for RawDetections {
  fn from(item: Detection) -> Self {
    RawDetections::Single(item)
  }
}

#[cfg(feature = "model_replay")]
mod replay;
#[cfg(feature = "model_replay")]
pub use self::replay::{ReplayModel, ReplayModelBuilder, ReplayModelError};
