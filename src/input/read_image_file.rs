// 该文件是 Tanzhao （探照） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::{Path, PathBuf};

use image::ImageFormat;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, payload::ImagePayload, url_file_path};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("Invalid path: {0}")]
  InvalidPath(#[from] std::string::FromUtf8Error),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Unrecognized image format: {0}")]
  UnknownFormat(PathBuf),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 从本地文件读取一张图像，作为一次检测的输入
pub struct ImageFileInput {
  path: PathBuf,
  format: ImageFormat,
  bytes: Vec<u8>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(url_file_path(url)?)
  }
}

impl ImageFileInput {
  pub fn open(path: impl Into<PathBuf>) -> Result<Self, ImageFileInputError> {
    let path = path.into();
    let bytes = std::fs::read(&path)?;
    // 优先按内容判断，扩展名只作后备
    let format = image::guess_format(&bytes)
      .or_else(|_| ImageFormat::from_path(&path))
      .map_err(|_| ImageFileInputError::UnknownFormat(path.clone()))?;
    debug!("读取图像 {} ({:?}, {} 字节)", path.display(), format, bytes.len());
    Ok(Self {
      path,
      format,
      bytes,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn format(&self) -> ImageFormat {
    self.format
  }

  /// 图像 (宽, 高)，用于在上传前确认文件可以解码
  pub fn dimensions(&self) -> Result<(u32, u32), ImageFileInputError> {
    let reader = image::ImageReader::with_format(std::io::Cursor::new(&self.bytes), self.format);
    Ok(reader.into_dimensions()?)
  }

  pub fn into_payload(self) -> ImagePayload {
    ImagePayload::from_bytes(self.format.to_mime_type(), &self.bytes)
  }
}
