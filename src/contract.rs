// 该文件是 Tanzhao （探照） 项目的一部分。
// src/contract.rs - 检测结果与推理进程消息协议
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

use serde::{Deserialize, Serialize};

use crate::payload::ImagePayload;

/// 推理进程在调用模型前未完成加载时返回的错误信息
pub const MODEL_NOT_LOADED: &str = "Model not loaded yet";
/// 错误消息为空时使用的默认文本
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// 源图像像素坐标下的轴对齐矩形，保证 xmin <= xmax 且 ymin <= ymax
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Corners")]
pub struct BoundingBox {
  xmin: f32,
  ymin: f32,
  xmax: f32,
  ymax: f32,
}

#[derive(Deserialize)]
struct Corners {
  xmin: f32,
  ymin: f32,
  xmax: f32,
  ymax: f32,
}

impl From<Corners> for BoundingBox {
  fn from(c: Corners) -> Self {
    BoundingBox::from_corners(c.xmin, c.ymin, c.xmax, c.ymax)
  }
}

impl BoundingBox {
  /// 由两个角点构造，坐标顺序颠倒时自动交换
  pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
    Self {
      xmin: x0.min(x1),
      ymin: y0.min(y1),
      xmax: x0.max(x1),
      ymax: y0.max(y1),
    }
  }

  pub fn xmin(&self) -> f32 {
    self.xmin
  }

  pub fn ymin(&self) -> f32 {
    self.ymin
  }

  pub fn xmax(&self) -> f32 {
    self.xmax
  }

  pub fn ymax(&self) -> f32 {
    self.ymax
  }

  pub fn width(&self) -> f32 {
    self.xmax - self.xmin
  }

  pub fn height(&self) -> f32 {
    self.ymax - self.ymin
  }

  /// 裁剪到 `width` x `height` 的图像范围内
  pub fn clamp_to(&self, width: u32, height: u32) -> Self {
    let (w, h) = (width as f32, height as f32);
    Self {
      xmin: self.xmin.clamp(0.0, w),
      ymin: self.ymin.clamp(0.0, h),
      xmax: self.xmax.clamp(0.0, w),
      ymax: self.ymax.clamp(0.0, h),
    }
  }
}

/// 一个被识别出的目标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub label: String,
  pub score: f32,
  #[serde(rename = "box")]
  pub bbox: BoundingBox,
}

impl Detection {
  pub fn new(label: impl Into<String>, score: f32, bbox: BoundingBox) -> Self {
    Self {
      label: label.into(),
      score,
      bbox,
    }
  }

  /// 将置信度限制在 [0, 1]，NaN 视为 0
  pub fn normalized(mut self) -> Self {
    self.score = if self.score.is_nan() {
      0.0
    } else {
      self.score.clamp(0.0, 1.0)
    };
    self
  }

  /// 置信度百分比（四舍五入）
  pub fn percent(&self) -> u32 {
    (self.score * 100.0).round().max(0.0) as u32
  }
}

/// 发往推理进程的请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
  LoadModel,
  Detect {
    #[serde(rename = "imageData")]
    image_data: ImagePayload,
  },
}

/// 推理进程发回协调器的响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Response {
  LoadProgress { progress: u8 },
  ModelReady,
  DetectionResult { results: Vec<Detection> },
  Error { message: String },
}

impl Response {
  pub fn error(message: impl Into<String>) -> Self {
    Response::Error {
      message: message.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bounding_box_orders_inverted_corners() {
    let bbox = BoundingBox::from_corners(400.0, 600.0, 100.0, 200.0);
    assert_eq!(bbox.xmin(), 100.0);
    assert_eq!(bbox.ymin(), 200.0);
    assert_eq!(bbox.xmax(), 400.0);
    assert_eq!(bbox.ymax(), 600.0);
    assert_eq!(bbox.width(), 300.0);
    assert_eq!(bbox.height(), 400.0);
  }

  #[test]
  fn deserialized_box_keeps_invariant() {
    let det: Detection = serde_json::from_str(
      r#"{"label":"dog","score":0.5,"box":{"xmin":50,"ymin":80,"xmax":10,"ymax":20}}"#,
    )
    .unwrap();
    assert!(det.bbox.xmin() <= det.bbox.xmax());
    assert!(det.bbox.ymin() <= det.bbox.ymax());
    assert_eq!(det.bbox.xmin(), 10.0);
  }

  #[test]
  fn clamp_to_image_bounds() {
    let bbox = BoundingBox::from_corners(-10.0, 5.0, 700.0, 900.0).clamp_to(640, 480);
    assert_eq!(bbox, BoundingBox::from_corners(0.0, 5.0, 640.0, 480.0));
  }

  #[test]
  fn normalized_score_stays_in_unit_range() {
    let bbox = BoundingBox::from_corners(0.0, 0.0, 1.0, 1.0);
    assert_eq!(Detection::new("a", 1.7, bbox).normalized().score, 1.0);
    assert_eq!(Detection::new("a", -0.2, bbox).normalized().score, 0.0);
    assert_eq!(Detection::new("a", f32::NAN, bbox).normalized().score, 0.0);
    assert_eq!(Detection::new("a", 0.87, bbox).percent(), 87);
  }

  #[test]
  fn messages_use_tagged_wire_shape() {
    let value = serde_json::to_value(Request::LoadModel).unwrap();
    assert_eq!(value, serde_json::json!({ "type": "load-model" }));

    let value = serde_json::to_value(Response::LoadProgress { progress: 42 }).unwrap();
    assert_eq!(
      value,
      serde_json::json!({ "type": "load-progress", "progress": 42 })
    );

    let det = Detection::new("cat", 0.5, BoundingBox::from_corners(1.0, 2.0, 3.0, 4.0));
    let value = serde_json::to_value(Response::DetectionResult { results: vec![det] }).unwrap();
    assert_eq!(value["type"], "detection-result");
    assert_eq!(value["results"][0]["box"]["xmax"], 3.0);

    let request: Request =
      serde_json::from_str(r#"{"type":"detect","imageData":"data:image/png;base64,AAAA"}"#)
        .unwrap();
    assert!(matches!(request, Request::Detect { .. }));
  }

  #[test]
  fn detect_request_rejects_invalid_payload() {
    let result: Result<Request, _> =
      serde_json::from_str(r#"{"type":"detect","imageData":""}"#);
    assert!(result.is_err());
  }
}
