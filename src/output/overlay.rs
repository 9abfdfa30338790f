// 该文件是 Tanzhao （探照） 项目的一部分。
// src/output/overlay.rs - 检测结果叠加层绘制
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{
  DynamicImage, Rgb, Rgba, RgbaImage,
  imageops::{self, FilterType},
};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::{
  contract::{BoundingBox, Detection},
  output::{glyphs, palette::color_of},
};

// 绘制常量
const LINE_WIDTH: f32 = 2.5;
const GLOW_RADIUS: u32 = 8;
const GLOW_STRENGTH: f32 = 0.5;
const LABEL_FONT_SIZE: f32 = 13.0;
const LABEL_GLYPH_SCALE: u32 = 1; // 无字体时点阵字形的放大倍数
const LABEL_HEIGHT: f32 = 22.0;
const LABEL_PADDING: f32 = 6.0;
const LABEL_GAP: f32 = 2.0;
const LABEL_ALPHA: f32 = 0.9;
const LABEL_RADIUS: f32 = 4.0;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

#[derive(Error, Debug)]
pub enum OverlayError {
  #[error("源图像尺寸为零")]
  EmptySource,
  #[error("字体文件错误: {0}")]
  Font(#[from] ab_glyph::InvalidFont),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

pub fn load_font(path: &Path) -> Result<FontArc, OverlayError> {
  let data = std::fs::read(path)?;
  Ok(FontArc::try_from_vec(data)?)
}

/// 源图像像素到显示像素的缩放，横纵方向各自独立
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleTransform {
  pub scale_x: f32,
  pub scale_y: f32,
}

impl ScaleTransform {
  pub fn between(source: (u32, u32), displayed: (u32, u32)) -> Result<Self, OverlayError> {
    let (sw, sh) = source;
    if sw == 0 || sh == 0 {
      return Err(OverlayError::EmptySource);
    }
    Ok(Self {
      scale_x: displayed.0 as f32 / sw as f32,
      scale_y: displayed.1 as f32 / sh as f32,
    })
  }

  pub fn map_box(&self, bbox: &BoundingBox) -> DisplayRect {
    DisplayRect {
      x: bbox.xmin() * self.scale_x,
      y: bbox.ymin() * self.scale_y,
      width: bbox.width() * self.scale_x,
      height: bbox.height() * self.scale_y,
    }
  }

  pub fn unmap_point(&self, x: f32, y: f32) -> (f32, f32) {
    (x / self.scale_x, y / self.scale_y)
  }
}

/// 显示空间中的矩形
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl DisplayRect {
  /// 四舍五入后的像素边界 (x0, y0, x1, y1)
  pub fn pixel_bounds(&self) -> (i32, i32, i32, i32) {
    (
      self.x.round() as i32,
      self.y.round() as i32,
      (self.x + self.width).round() as i32,
      (self.y + self.height).round() as i32,
    )
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
  pub line_width: f32,
  pub glow_radius: u32,
  pub glow_strength: f32,
  pub font_size: f32,
  pub glyph_scale: u32,
  pub label_height: f32,
  pub label_padding: f32,
  pub label_gap: f32,
  pub label_alpha: f32,
  pub label_radius: f32,
  pub text_color: Rgb<u8>,
}

impl Default for OverlayStyle {
  fn default() -> Self {
    Self {
      line_width: LINE_WIDTH,
      glow_radius: GLOW_RADIUS,
      glow_strength: GLOW_STRENGTH,
      font_size: LABEL_FONT_SIZE,
      glyph_scale: LABEL_GLYPH_SCALE,
      label_height: LABEL_HEIGHT,
      label_padding: LABEL_PADDING,
      label_gap: LABEL_GAP,
      label_alpha: LABEL_ALPHA,
      label_radius: LABEL_RADIUS,
      text_color: LABEL_TEXT_COLOR,
    }
  }
}

impl OverlayStyle {
  /// 标签优先放在框的上方；超出绘制区域顶部时改放到框顶边内侧
  pub fn label_top(&self, rect: &DisplayRect) -> f32 {
    let above = rect.y - self.label_height - self.label_gap;
    if above < 0.0 {
      rect.y + self.label_gap
    } else {
      above
    }
  }
}

pub fn label_text(detection: &Detection) -> String {
  format!("{} {}%", detection.label, detection.percent())
}

/// 单个检测在显示空间中的绘制描述
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayItem {
  pub color: Rgb<u8>,
  pub rect: DisplayRect,
  pub label: String,
  pub label_rect: DisplayRect,
}

pub fn layout_items(
  detections: &[Detection],
  transform: ScaleTransform,
  style: &OverlayStyle,
  measure: impl Fn(&str) -> f32,
) -> Vec<OverlayItem> {
  detections
    .iter()
    .enumerate()
    .map(|(index, detection)| {
      let rect = transform.map_box(&detection.bbox);
      let label = label_text(detection);
      let label_rect = DisplayRect {
        x: rect.x,
        y: style.label_top(&rect),
        width: measure(&label) + 2.0 * style.label_padding,
        height: style.label_height,
      };
      OverlayItem {
        color: color_of(index),
        rect,
        label,
        label_rect,
      }
    })
    .collect()
}

/// 叠加层渲染器。
///
/// 宿主在检测结果变化、显示区域尺寸变化或图像加载完成时通知渲染器，
/// `render` 只在有变化时重新绘制；图像尚未加载时返回 `Ok(None)`。
pub struct OverlayRenderer {
  style: OverlayStyle,
  font: Option<FontArc>,
  source: Option<RgbaImage>,
  detections: Vec<Detection>,
  surface: (u32, u32),
  frame: Option<RgbaImage>,
  dirty: bool,
}

impl Default for OverlayRenderer {
  fn default() -> Self {
    Self::new(OverlayStyle::default())
  }
}

impl OverlayRenderer {
  pub fn new(style: OverlayStyle) -> Self {
    Self {
      style,
      font: None,
      source: None,
      detections: Vec::new(),
      surface: (0, 0),
      frame: None,
      dirty: true,
    }
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self.dirty = true;
    self
  }

  pub fn set_detections(&mut self, detections: Vec<Detection>) {
    self.detections = detections;
    self.dirty = true;
  }

  pub fn resize(&mut self, width: u32, height: u32) {
    if self.surface != (width, height) {
      self.surface = (width, height);
      self.dirty = true;
    }
  }

  pub fn image_loaded(&mut self, image: &DynamicImage) {
    self.source = Some(image.to_rgba8());
    self.dirty = true;
  }

  pub fn is_image_loaded(&self) -> bool {
    self.source.is_some()
  }

  pub fn surface_size(&self) -> (u32, u32) {
    self.surface
  }

  /// 当前布局；图像未加载时为 None
  pub fn items(&self) -> Result<Option<Vec<OverlayItem>>, OverlayError> {
    let Some(source) = self.source.as_ref() else {
      return Ok(None);
    };
    let transform = ScaleTransform::between(source.dimensions(), self.surface)?;
    Ok(Some(layout_items(
      &self.detections,
      transform,
      &self.style,
      |text| self.measure(text),
    )))
  }

  pub fn render(&mut self) -> Result<Option<&RgbaImage>, OverlayError> {
    if !self.dirty {
      return Ok(self.frame.as_ref());
    }
    let Some(source) = self.source.as_ref() else {
      debug!("图像尚未加载，推迟绘制");
      return Ok(None);
    };
    let (width, height) = self.surface;
    if width == 0 || height == 0 {
      debug!("绘制区域为空，跳过绘制");
      return Ok(None);
    }

    let transform = ScaleTransform::between(source.dimensions(), self.surface)?;
    let mut canvas = imageops::resize(source, width, height, FilterType::Triangle);
    let items = layout_items(&self.detections, transform, &self.style, |text| {
      self.measure(text)
    });
    for item in &items {
      self.draw_item(&mut canvas, item);
    }
    debug!("绘制 {} 个检测框，尺寸 {}x{}", items.len(), width, height);

    self.frame = Some(canvas);
    self.dirty = false;
    Ok(self.frame.as_ref())
  }

  fn measure(&self, text: &str) -> f32 {
    match &self.font {
      Some(font) => text_size(PxScale::from(self.style.font_size), font, text).0 as f32,
      None => glyphs::text_width(text, self.style.glyph_scale),
    }
  }

  fn draw_item(&self, canvas: &mut RgbaImage, item: &OverlayItem) {
    let Rgb([r, g, b]) = item.color;
    let color = Rgba([r, g, b, 255]);
    let (x0, y0, x1, y1) = item.rect.pixel_bounds();
    let thickness = self.style.line_width.round().max(1.0) as i32;

    // 光晕：由外向内逐渐增强
    let radius = self.style.glow_radius as i32;
    for ring in (1..=radius).rev() {
      let alpha = self.style.glow_strength * (1.0 - ring as f32 / (radius as f32 + 1.0));
      let grow = thickness / 2 + ring;
      let bounds = (x0 - grow, y0 - grow, x1 + grow, y1 + grow);
      blend_hollow_rect(canvas, bounds, color, alpha);
    }

    // 边框
    for t in 0..thickness {
      let inset = t - thickness / 2;
      stroke_rect(canvas, (x0 + inset, y0 + inset, x1 - inset, y1 - inset), color);
    }

    // 标签背景
    blend_rounded_rect(
      canvas,
      item.label_rect.pixel_bounds(),
      self.style.label_radius,
      color,
      self.style.label_alpha,
    );

    // 文字：有字体时用字体，否则用内置点阵字形
    let Rgb([tr, tg, tb]) = self.style.text_color;
    let ink = Rgba([tr, tg, tb, 255]);
    let text_x = (item.label_rect.x + self.style.label_padding).round() as i32;
    match &self.font {
      Some(font) => {
        let text_y = (item.label_rect.y + (self.style.label_height - self.style.font_size) / 2.0)
          .round() as i32;
        draw_text_mut(
          canvas,
          ink,
          text_x,
          text_y,
          PxScale::from(self.style.font_size),
          font,
          &item.label,
        );
      }
      None => {
        let glyph_height = (glyphs::GLYPH_HEIGHT * self.style.glyph_scale.max(1)) as f32;
        let text_y =
          (item.label_rect.y + (self.style.label_height - glyph_height) / 2.0).round() as i32;
        glyphs::draw_text(
          canvas,
          text_x,
          text_y,
          self.style.glyph_scale,
          ink,
          &item.label,
        );
      }
    }
  }
}

fn stroke_rect(canvas: &mut RgbaImage, bounds: (i32, i32, i32, i32), color: Rgba<u8>) {
  let (x0, y0, x1, y1) = bounds;
  if x1 < x0 || y1 < y0 {
    return;
  }
  let rect = Rect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
  draw_hollow_rect_mut(canvas, rect, color);
}

fn blend_pixel(canvas: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>, alpha: f32) {
  if x < 0 || y < 0 || x >= canvas.width() as i32 || y >= canvas.height() as i32 {
    return;
  }
  let pixel = canvas.get_pixel_mut(x as u32, y as u32);
  for c in 0..3 {
    pixel[c] = (pixel[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha).round() as u8;
  }
}

// 圆角矩形填充；边界 (x0, y0) 包含，(x1, y1) 不包含
fn blend_rounded_rect(
  canvas: &mut RgbaImage,
  bounds: (i32, i32, i32, i32),
  radius: f32,
  color: Rgba<u8>,
  alpha: f32,
) {
  let (x0, y0, x1, y1) = bounds;
  if x1 <= x0 || y1 <= y0 {
    return;
  }
  let (left, top, right, bottom) = (x0 as f32, y0 as f32, x1 as f32, y1 as f32);
  let radius = radius.max(0.0).min((right - left) / 2.0).min((bottom - top) / 2.0);
  let (w, h) = (canvas.width() as i32, canvas.height() as i32);
  for y in y0.max(0)..y1.min(h) {
    for x in x0.max(0)..x1.min(w) {
      // 像素中心到圆角圆心的距离
      let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
      let cx = px.clamp(left + radius, right - radius);
      let cy = py.clamp(top + radius, bottom - radius);
      if (px - cx).powi(2) + (py - cy).powi(2) <= radius * radius {
        blend_pixel(canvas, x, y, color, alpha);
      }
    }
  }
}

fn blend_hollow_rect(
  canvas: &mut RgbaImage,
  bounds: (i32, i32, i32, i32),
  color: Rgba<u8>,
  alpha: f32,
) {
  let (x0, y0, x1, y1) = bounds;
  let (w, h) = (canvas.width() as i32, canvas.height() as i32);
  for x in x0.max(0)..=x1.min(w - 1) {
    blend_pixel(canvas, x, y0, color, alpha);
    if y1 != y0 {
      blend_pixel(canvas, x, y1, color, alpha);
    }
  }
  for y in (y0 + 1).max(0)..y1.min(h) {
    blend_pixel(canvas, x0, y, color, alpha);
    if x1 != x0 {
      blend_pixel(canvas, x1, y, color, alpha);
    }
  }
}
