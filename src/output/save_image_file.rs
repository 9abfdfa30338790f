// 该文件是 Tanzhao （探照） 项目的一部分。
// src/output/save_image_file.rs - 保存带叠加层的图像文件
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

use ab_glyph::FontArc;
use image::DynamicImage;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  contract::Detection,
  output::{
    Render,
    overlay::{OverlayError, OverlayRenderer, OverlayStyle},
    summary::fit_within,
  },
  payload::{ImagePayload, PayloadError},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("图像数据错误: {0}")]
  PayloadError(#[from] PayloadError),
  #[error("叠加层绘制错误: {0}")]
  OverlayError(#[from] OverlayError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无效的输出参数: {0}")]
  InvalidParameter(String),
}

/// 把检测结果绘制在原图上并保存。
///
/// URL 形如 `image:///tmp/out.png?width=640&height=480`，
/// 可选的宽高表示显示容器，图像按比例缩小放入其中（不放大）。
pub struct SaveImageFileOutput {
  path: PathBuf,
  container: Option<(u32, u32)>,
  style: OverlayStyle,
  font: Option<FontArc>,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let path = url_file_path(uri)
      .map_err(|e| SaveImageFileError::InvalidParameter(format!("路径解码失败: {e}")))?;

    let mut width = None;
    let mut height = None;
    for (key, value) in uri.query_pairs() {
      let parsed = || {
        value
          .parse::<u32>()
          .map_err(|e| SaveImageFileError::InvalidParameter(format!("{key}={value}: {e}")))
      };
      match key.as_ref() {
        "width" => width = Some(parsed()?),
        "height" => height = Some(parsed()?),
        other => warn!("忽略未知的输出参数: {}", other),
      }
    }

    let container = match (width, height) {
      (Some(w), Some(h)) => Some((w, h)),
      (None, None) => None,
      _ => {
        return Err(SaveImageFileError::InvalidParameter(
          "width 与 height 必须同时给出".to_string(),
        ));
      }
    };

    Ok(SaveImageFileOutput {
      path,
      container,
      style: OverlayStyle::default(),
      font: None,
    })
  }
}

impl SaveImageFileOutput {
  pub fn with_path(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      container: None,
      style: OverlayStyle::default(),
      font: None,
    }
  }

  pub fn with_container(mut self, width: u32, height: u32) -> Self {
    self.container = Some((width, height));
    self
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_style(mut self, style: OverlayStyle) -> Self {
    self.style = style;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 绘制后的图像尺寸
  pub fn display_size(&self, source: (u32, u32)) -> (u32, u32) {
    match self.container {
      Some(container) => fit_within(source, container),
      None => source,
    }
  }

  fn save_image(&self, image: DynamicImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    // JPEG 等格式不支持透明通道
    image.to_rgb8().save(&self.path)?;

    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<ImagePayload, [Detection]> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(
    &self,
    frame: &ImagePayload,
    result: &[Detection],
  ) -> Result<(), Self::Error> {
    let image = frame.decode_image()?;
    let (width, height) = self.display_size((image.width(), image.height()));

    let mut renderer = OverlayRenderer::new(self.style.clone());
    if let Some(font) = self.font.clone() {
      renderer = renderer.with_font(font);
    }
    renderer.set_detections(result.to_vec());
    renderer.resize(width, height);
    renderer.image_loaded(&image);

    match renderer.render()? {
      Some(canvas) => self.save_image(DynamicImage::ImageRgba8(canvas.clone())),
      None => {
        warn!("图像尺寸为零，未保存 {}", self.path.display());
        Err(OverlayError::EmptySource.into())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::contract::BoundingBox;
  use image::{ImageFormat, Rgb, RgbImage};

  fn url(s: &str) -> Url {
    Url::parse(s).expect("valid url")
  }

  fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir()
      .join(format!("tanzhao-save-{}", std::process::id()))
      .join(name)
  }

  #[test]
  fn parses_path_and_container() {
    let output =
      SaveImageFileOutput::from_url(&url("image:///tmp/out%20dir/a.png?width=640&height=480"))
        .expect("valid output url");
    assert_eq!(output.path(), Path::new("/tmp/out dir/a.png"));
    assert_eq!(output.display_size((1280, 720)), (640, 360));

    let plain =
      SaveImageFileOutput::from_url(&url("image:///tmp/a.png")).expect("valid output url");
    assert_eq!(plain.display_size((1280, 720)), (1280, 720));
  }

  #[test]
  fn rejects_bad_urls() {
    assert!(matches!(
      SaveImageFileOutput::from_url(&url("file:///tmp/a.png")),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
    assert!(matches!(
      SaveImageFileOutput::from_url(&url("image:///tmp/a.png?width=10")),
      Err(SaveImageFileError::InvalidParameter(_))
    ));
    assert!(matches!(
      SaveImageFileOutput::from_url(&url("image:///tmp/a.png?width=ten&height=10")),
      Err(SaveImageFileError::InvalidParameter(_))
    ));
  }

  #[test]
  fn writes_scaled_overlay() {
    let source = RgbImage::from_pixel(400, 200, Rgb([255, 255, 255]));
    let payload = ImagePayload::encode_image(&DynamicImage::ImageRgb8(source), ImageFormat::Png)
      .expect("encode png");
    let detections = vec![Detection::new(
      "cat",
      0.87,
      BoundingBox::from_corners(100.0, 80.0, 300.0, 180.0),
    )];

    let path = temp_path("nested/out.png");
    let _ = std::fs::remove_file(&path);
    let output = SaveImageFileOutput::with_path(&path).with_container(200, 200);
    output
      .render_result(&payload, &detections)
      .expect("render and save");

    let saved = image::open(&path).expect("saved image").to_rgb8();
    assert_eq!(saved.dimensions(), (200, 100));
    // 框左边在显示空间 x = 50，y 方向 40..90
    assert_ne!(*saved.get_pixel(50, 60), Rgb([255, 255, 255]));
    assert_eq!(*saved.get_pixel(100, 65), Rgb([255, 255, 255]));
    let _ = std::fs::remove_dir_all(path.parent().and_then(Path::parent).unwrap_or(&path));
  }

  #[test]
  fn custom_style_is_used_for_drawing() {
    let source = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
    let payload = ImagePayload::encode_image(&DynamicImage::ImageRgb8(source), ImageFormat::Png)
      .expect("encode png");
    let detections = vec![Detection::new(
      "dog",
      0.5,
      BoundingBox::from_corners(50.0, 100.0, 150.0, 180.0),
    )];
    let style = OverlayStyle {
      label_height: 40.0,
      label_alpha: 1.0,
      label_radius: 0.0,
      glyph_scale: 3,
      ..OverlayStyle::default()
    };

    let path = temp_path("styled.png");
    let output = SaveImageFileOutput::with_path(&path).with_style(style);
    output
      .render_result(&payload, &detections)
      .expect("render and save");

    let saved = image::open(&path).expect("saved image").to_rgb8();
    // 标签高 40，位于框上方 y = 58..98，直角且不透明
    let corner = *saved.get_pixel(50, 58);
    assert_ne!(corner, Rgb([255, 255, 255]));
    assert_eq!(*saved.get_pixel(50, 57), Rgb([255, 255, 255]));
    let _ = std::fs::remove_file(&path);
  }
}
