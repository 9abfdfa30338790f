// 该文件是 Tanzhao （探照） 项目的一部分。
// src/payload.rs - 自包含图像数据（base64 data URI）
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

use std::{fmt, io::Cursor, sync::Arc};

use base64::{Engine, prelude::BASE64_STANDARD};
use image::{DynamicImage, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DATA_URI_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64";

#[derive(Error, Debug)]
pub enum PayloadError {
  #[error("图像数据为空")]
  Empty,
  #[error("不是 data URI")]
  NotDataUri,
  #[error("仅支持 base64 编码的 data URI")]
  NotBase64,
  #[error("base64 解码错误: {0}")]
  Base64(#[from] base64::DecodeError),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

/// 采集或上传得到的图像，形如 `data:image/png;base64,....`。
///
/// 构造后不可变，克隆只增加引用计数，推理进程与渲染端共享同一份数据。
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImagePayload(Arc<str>);

impl ImagePayload {
  pub fn new(data_uri: impl Into<String>) -> Result<Self, PayloadError> {
    let data_uri = data_uri.into();
    split_data_uri(&data_uri)?;
    Ok(Self(Arc::from(data_uri)))
  }

  /// 将已编码的图像字节包装为 data URI
  pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
    let data_uri = format!(
      "{DATA_URI_PREFIX}{mime}{BASE64_MARKER},{}",
      BASE64_STANDARD.encode(bytes)
    );
    Self(Arc::from(data_uri))
  }

  /// 以给定格式编码图像
  pub fn encode_image(image: &DynamicImage, format: ImageFormat) -> Result<Self, PayloadError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format)?;
    Ok(Self::from_bytes(format.to_mime_type(), &bytes))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn mime(&self) -> &str {
    split_data_uri(&self.0).map(|(mime, _)| mime).unwrap_or_default()
  }

  pub fn decode_bytes(&self) -> Result<Vec<u8>, PayloadError> {
    let (_, data) = split_data_uri(&self.0)?;
    Ok(BASE64_STANDARD.decode(data)?)
  }

  pub fn decode_image(&self) -> Result<DynamicImage, PayloadError> {
    let bytes = self.decode_bytes()?;
    Ok(image::load_from_memory(&bytes)?)
  }

  /// 只读取图像头获得 (宽, 高)，不解码像素
  pub fn dimensions(&self) -> Result<(u32, u32), PayloadError> {
    let bytes = self.decode_bytes()?;
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    Ok(reader.into_dimensions()?)
  }
}

// 返回 (mime, base64 数据)
fn split_data_uri(data_uri: &str) -> Result<(&str, &str), PayloadError> {
  if data_uri.is_empty() {
    return Err(PayloadError::Empty);
  }
  let rest = data_uri
    .strip_prefix(DATA_URI_PREFIX)
    .ok_or(PayloadError::NotDataUri)?;
  let (header, data) = rest.split_once(',').ok_or(PayloadError::NotDataUri)?;
  let mime = header
    .strip_suffix(BASE64_MARKER)
    .ok_or(PayloadError::NotBase64)?;
  if data.is_empty() {
    return Err(PayloadError::Empty);
  }
  Ok((mime, data))
}

impl TryFrom<String> for ImagePayload {
  type Error = PayloadError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    ImagePayload::new(value)
  }
}

impl From<ImagePayload> for String {
  fn from(payload: ImagePayload) -> Self {
    payload.0.to_string()
  }
}

impl fmt::Debug for ImagePayload {
  // 数据可能有数 MB，日志中只打印类型与长度
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ImagePayload")
      .field("mime", &self.mime())
      .field("len", &self.0.len())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn png_payload(width: u32, height: u32) -> ImagePayload {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 20, 30])));
    ImagePayload::encode_image(&image, ImageFormat::Png).unwrap()
  }

  #[test]
  fn rejects_malformed_data_uri() {
    assert!(matches!(ImagePayload::new(""), Err(PayloadError::Empty)));
    assert!(matches!(
      ImagePayload::new("http://example.com/cat.png"),
      Err(PayloadError::NotDataUri)
    ));
    assert!(matches!(
      ImagePayload::new("data:image/png,rawbytes"),
      Err(PayloadError::NotBase64)
    ));
    assert!(matches!(
      ImagePayload::new("data:image/png;base64,"),
      Err(PayloadError::Empty)
    ));
  }

  #[test]
  fn bytes_survive_encoding() {
    let payload = ImagePayload::from_bytes("image/jpeg", b"\xff\xd8\xff");
    assert_eq!(payload.mime(), "image/jpeg");
    assert!(payload.as_str().starts_with("data:image/jpeg;base64,"));
    assert_eq!(payload.decode_bytes().unwrap(), b"\xff\xd8\xff");
  }

  #[test]
  fn reads_dimensions_and_pixels() {
    let payload = png_payload(12, 7);
    assert_eq!(payload.mime(), "image/png");
    assert_eq!(payload.dimensions().unwrap(), (12, 7));
    let image = payload.decode_image().unwrap().to_rgb8();
    assert_eq!(image.get_pixel(3, 3), &Rgb([10, 20, 30]));
  }

  #[test]
  fn undecodable_image_is_an_error() {
    let payload = ImagePayload::from_bytes("image/png", b"definitely not a png");
    assert!(payload.decode_image().is_err());
    assert!(payload.dimensions().is_err());
  }

  #[test]
  fn debug_output_omits_data() {
    let payload = png_payload(2, 2);
    let text = format!("{payload:?}");
    assert!(text.contains("image/png"));
    assert!(!text.contains("base64"));
  }
}
