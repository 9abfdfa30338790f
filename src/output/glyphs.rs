// 该文件是 Tanzhao （探照） 项目的一部分。
// src/output/glyphs.rs - 内置 5x7 点阵字形
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

//! 未配置 TTF 字体时用于绘制标签文字。小写字母按大写绘制。

use image::{Rgba, RgbaImage};

pub const GLYPH_WIDTH: u32 = 5;
pub const GLYPH_HEIGHT: u32 = 7;
const ADVANCE: u32 = GLYPH_WIDTH + 1;

// 每行低 5 位，最高位在左
fn glyph(ch: char) -> [u8; 7] {
  match ch.to_ascii_uppercase() {
    'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
    'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
    'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
    'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
    'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
    'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
    'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
    'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
    'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
    'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
    'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
    'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
    'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
    'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
    'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
    'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
    'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
    'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
    'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
    'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
    'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
    'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
    'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
    'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
    'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
    'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
    '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
    '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
    '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
    '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
    '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
    '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
    '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
    '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
    '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
    '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
    '%' => [0b11000, 0b11001, 0b00010, 0b00100, 0b01000, 0b10011, 0b00011],
    '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
    ',' => [0, 0, 0, 0, 0b01100, 0b00100, 0b01000],
    '-' => [0, 0, 0, 0b11111, 0, 0, 0],
    '_' => [0, 0, 0, 0, 0, 0, 0b11111],
    ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
    '/' => [0b00001, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b10000],
    '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
    ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
    ' ' => [0; 7],
    _ => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0, 0b00100],
  }
}

/// 以 `scale` 倍绘制时文字的像素宽度（不含末尾字间距）
pub fn text_width(text: &str, scale: u32) -> f32 {
  let count = text.chars().count() as u32;
  if count == 0 {
    return 0.0;
  }
  ((count * ADVANCE - 1) * scale.max(1)) as f32
}

/// 左上角为 (x, y)，超出画布的部分被裁掉
pub fn draw_text(canvas: &mut RgbaImage, x: i32, y: i32, scale: u32, color: Rgba<u8>, text: &str) {
  let scale = scale.max(1) as i32;
  let (width, height) = (canvas.width() as i32, canvas.height() as i32);
  let mut origin = x;
  for ch in text.chars() {
    for (row, bits) in glyph(ch).iter().enumerate() {
      for col in 0..GLYPH_WIDTH as i32 {
        if (bits >> (GLYPH_WIDTH as i32 - 1 - col)) & 1 == 0 {
          continue;
        }
        for dy in 0..scale {
          for dx in 0..scale {
            let px = origin + col * scale + dx;
            let py = y + row as i32 * scale + dy;
            if px >= 0 && py >= 0 && px < width && py < height {
              canvas.put_pixel(px as u32, py as u32, color);
            }
          }
        }
      }
    }
    origin += ADVANCE as i32 * scale;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);

  fn ink_count(canvas: &RgbaImage) -> usize {
    canvas.pixels().filter(|p| **p == INK).count()
  }

  #[test]
  fn width_follows_scale() {
    assert_eq!(text_width("", 1), 0.0);
    assert_eq!(text_width("cat 87%", 1), 41.0);
    assert_eq!(text_width("cat 87%", 2), 82.0);
  }

  #[test]
  fn lowercase_matches_uppercase() {
    let mut lower = RgbaImage::from_pixel(40, 10, Rgba([255; 4]));
    let mut upper = lower.clone();
    draw_text(&mut lower, 1, 1, 1, INK, "cat");
    draw_text(&mut upper, 1, 1, 1, INK, "CAT");
    assert_eq!(lower, upper);
    assert!(ink_count(&lower) > 0);
  }

  #[test]
  fn space_draws_nothing_and_edges_clip() {
    let mut canvas = RgbaImage::from_pixel(8, 8, Rgba([255; 4]));
    draw_text(&mut canvas, 0, 0, 1, INK, "   ");
    assert_eq!(ink_count(&canvas), 0);
    draw_text(&mut canvas, -3, 4, 2, INK, "88");
    assert!(ink_count(&canvas) > 0);
  }
}
