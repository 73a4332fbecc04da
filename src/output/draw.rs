// 该文件是 Kanlian （看脸） 项目的一部分。
// src/output/draw.rs - 在图像上绘制人脸框与关键点
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

use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_circle_mut, draw_hollow_rect_mut},
  rect::Rect,
};

use crate::model::{DetectItem, DetectResult};

const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const SELECTED_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const BOX_THICKNESS: i32 = 2;
const LANDMARK_RADIUS: i32 = 2;

// 左眼、右眼、鼻尖、左嘴角、右嘴角
const LANDMARK_COLORS: [[u8; 3]; 5] = [
  [255, 0, 0],
  [0, 255, 255],
  [255, 0, 255],
  [0, 255, 0],
  [255, 255, 0],
];

pub struct Draw {
  box_color: [u8; 3],
  selected_color: [u8; 3],
  thickness: i32,
  landmark_radius: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      box_color: BOX_COLOR,
      selected_color: SELECTED_COLOR,
      thickness: BOX_THICKNESS,
      landmark_radius: LANDMARK_RADIUS,
    }
  }
}

impl Draw {
  fn draw_bbox(&self, image: &mut RgbImage, bbox: &[f32; 4], color: [u8; 3]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);

    for t in 0..self.thickness {
      let width = x_max - x_min - 2 * t + 1;
      let height = y_max - y_min - 2 * t + 1;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(color));
    }
  }

  fn draw_landmarks(&self, image: &mut RgbImage, item: &DetectItem) {
    for (point, color) in item.landmarks.iter().zip(LANDMARK_COLORS) {
      let center = (point[0].round() as i32, point[1].round() as i32);
      draw_filled_circle_mut(image, center, self.landmark_radius, Rgb(color));
    }
  }

  /// 绘制全部人脸；`selected` 若给出则以另一种颜色标出
  pub fn draw_detections(
    &self,
    image: &mut RgbImage,
    result: &DetectResult,
    selected: Option<&DetectItem>,
  ) {
    for item in result.iter() {
      let color = if selected == Some(item) {
        self.selected_color
      } else {
        self.box_color
      };
      self.draw_bbox(image, &item.bbox, color);
      self.draw_landmarks(image, item);
    }
  }
}
