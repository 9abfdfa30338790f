// 该文件是 Tanzhao （探照） 项目的一部分。
// src/output/summary.rs - 检测结果文字摘要
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

use crate::{
  contract::{Detection, UNKNOWN_ERROR},
  coordinator::{Phase, SessionState},
  output::palette::{color_of, to_hex},
};

/// 按置信度降序取前 `n` 个（同分保持原顺序）
pub fn top_by_score(detections: &[Detection], n: usize) -> Vec<Detection> {
  let mut sorted = detections.to_vec();
  sorted.sort_by(|a, b| b.score.total_cmp(&a.score));
  sorted.truncate(n);
  sorted
}

/// 结果面板的文字行，颜色与叠加层中同序号的检测框一致
pub fn results_panel(detections: &[Detection], detecting: bool) -> Vec<String> {
  if detecting {
    return vec!["Analyzing image…".to_string()];
  }
  if detections.is_empty() {
    return vec!["No detections yet".to_string()];
  }

  let mut lines = Vec::with_capacity(detections.len() + 1);
  lines.push(format!("Detected Objects — {} found", detections.len()));
  for (index, detection) in detections.iter().enumerate() {
    lines.push(format!(
      "{} {:<16} {:>3}%",
      to_hex(color_of(index)),
      detection.label,
      detection.percent()
    ));
  }
  lines
}

pub fn status_line(state: &SessionState) -> String {
  match state.phase() {
    Phase::Idle => "Initializing…".to_string(),
    Phase::Loading if state.progress() > 0 => format!("{}% downloaded", state.progress()),
    Phase::Loading => "Initializing…".to_string(),
    Phase::Detecting => "Scanning...".to_string(),
    Phase::Error => state.error_message().unwrap_or(UNKNOWN_ERROR).to_string(),
    Phase::Ready => "Ready".to_string(),
  }
}

/// 在容器内按原比例放下图像的显示尺寸，只缩小不放大
pub fn fit_within(source: (u32, u32), container: (u32, u32)) -> (u32, u32) {
  let (sw, sh) = source;
  let (cw, ch) = container;
  if sw == 0 || sh == 0 {
    return (0, 0);
  }
  let scale = (cw as f64 / sw as f64).min(ch as f64 / sh as f64).min(1.0);
  (
    ((sw as f64 * scale).round() as u32).max(1),
    ((sh as f64 * scale).round() as u32).max(1),
  )
}
