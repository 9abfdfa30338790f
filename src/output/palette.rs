// 该文件是 Tanzhao （探照） 项目的一部分。
// src/output/palette.rs - 检测框配色
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

use image::Rgb;

/// 十种易区分的霓虹色，按结果列表中的序号循环使用
pub const PALETTE: [Rgb<u8>; 10] = [
  Rgb([0x38, 0xBD, 0xF8]), // sky
  Rgb([0xF4, 0x72, 0xB6]), // pink
  Rgb([0x34, 0xD3, 0x99]), // emerald
  Rgb([0xFB, 0xBF, 0x24]), // amber
  Rgb([0xA7, 0x8B, 0xFA]), // violet
  Rgb([0xFB, 0x92, 0x3C]), // orange
  Rgb([0x2D, 0xD4, 0xBF]), // teal
  Rgb([0xF8, 0x71, 0x71]), // red
  Rgb([0x81, 0x8C, 0xF8]), // indigo
  Rgb([0x4A, 0xDE, 0x80]), // green
];

/// 颜色只由序号决定，不是跨检测周期的稳定标识
pub fn color_of(index: usize) -> Rgb<u8> {
  PALETTE[index % PALETTE.len()]
}

pub fn to_hex(color: Rgb<u8>) -> String {
  let Rgb([r, g, b]) = color;
  format!("#{r:02X}{g:02X}{b:02X}")
}
