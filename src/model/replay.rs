// 该文件是 Tanzhao （探照） 项目的一部分。
// src/model/replay.rs - 回放模型：从 JSON 制品中读取预先计算好的检测结果
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
  fs::File,
  io::Read,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  contract::Detection,
  model::{Model, ModelBuilder, RawDetections},
  payload::{ImagePayload, PayloadError},
  url_file_path,
};

const READ_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum ReplayModelError {
  #[error("模型路径必须使用 replay 方案, 实际为 '{0}'")]
  SchemeMismatch(String),
  #[error("模型路径解码错误: {0}")]
  PathDecode(#[from] std::string::FromUtf8Error),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("模型文件格式错误: {0}")]
  Malformed(#[from] serde_json::Error),
  #[error("图像数据错误: {0}")]
  Payload(#[from] PayloadError),
}

pub struct ReplayModelBuilder {
  path: PathBuf,
}

impl FromUrlWithScheme for ReplayModelBuilder {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModelBuilder {
  type Error = ReplayModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayModelError::SchemeMismatch(url.scheme().to_string()));
    }

    Ok(ReplayModelBuilder {
      path: url_file_path(url)?,
    })
  }
}

impl ReplayModelBuilder {
  pub fn with_path(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl ModelBuilder for ReplayModelBuilder {
  type Model = ReplayModel;
  type Error = ReplayModelError;

  fn build(&mut self, progress: &mut dyn FnMut(f32)) -> Result<Self::Model, Self::Error> {
    info!("加载模型文件: {}", self.path.display());
    let mut file = File::open(&self.path)?;
    let total = file.metadata()?.len();

    let mut data = Vec::with_capacity(total as usize);
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
      let read = file.read(&mut chunk)?;
      if read == 0 {
        break;
      }
      data.extend_from_slice(&chunk[..read]);
      if total > 0 {
        progress(data.len() as f32 * 100.0 / total as f32);
      }
    }
    debug!("模型文件大小: {:.2} KB", data.len() as f64 / 1024.0);

    let detections: RawDetections = serde_json::from_slice(&data)?;
    info!("模型加载完成");
    Ok(ReplayModel { detections })
  }
}

/// 对任意图像返回制品中记录的检测结果（按阈值过滤、裁剪到图像范围）
#[derive(Debug)]
pub struct ReplayModel {
  detections: RawDetections,
}

impl Model for ReplayModel {
  type Error = ReplayModelError;

  fn infer(&self, image: &ImagePayload, threshold: f32) -> Result<RawDetections, Self::Error> {
    let (width, height) = image.dimensions()?;
    debug!("输入图像尺寸: {}x{}", width, height);

    let fit = |det: &Detection| {
      Detection::new(
        det.label.clone(),
        det.score,
        det.bbox.clamp_to(width, height),
      )
    };

    let output = match &self.detections {
      RawDetections::Single(det) if det.score >= threshold => RawDetections::Single(fit(det)),
      RawDetections::Single(_) => RawDetections::Many(Vec::new()),
      RawDetections::Many(items) => RawDetections::Many(
        items
          .iter()
          .filter(|det| det.score >= threshold)
          .map(fit)
          .collect(),
      ),
    };
    Ok(output)
  }
}
