// 该文件是 Dushu （读数） 项目的一部分。
// src/classifier/template.rs - 七段码模板匹配分类器
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

use image::{GrayImage, Luma, imageops};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use imageproc::template_matching::{MatchTemplateMethod, match_template};
use tracing::{debug, info};

use super::{Classification, Classifier, ClassifierError};

const TEMPLATE_WIDTH: u32 = 60;
const TEMPLATE_HEIGHT: u32 = 100;
const SEGMENT_THICKNESS: i32 = 12;
const SEGMENT_MARGIN: i32 = 8;

// 段位编码: A 上横, B 右上竖, C 右下竖, D 下横, E 左下竖, F 左上竖, G 中横
const SEG_A: u8 = 0x01;
const SEG_B: u8 = 0x02;
const SEG_C: u8 = 0x04;
const SEG_D: u8 = 0x08;
const SEG_E: u8 = 0x10;
const SEG_F: u8 = 0x20;
const SEG_G: u8 = 0x40;

/// 0-9 各数字点亮的段位
const DIGIT_SEGMENTS: [u8; 10] = [
  SEG_A | SEG_B | SEG_C | SEG_D | SEG_E | SEG_F,         // 0
  SEG_B | SEG_C,                                         // 1
  SEG_A | SEG_B | SEG_D | SEG_E | SEG_G,                 // 2
  SEG_A | SEG_B | SEG_C | SEG_D | SEG_G,                 // 3
  SEG_B | SEG_C | SEG_F | SEG_G,                         // 4
  SEG_A | SEG_C | SEG_D | SEG_F | SEG_G,                 // 5
  SEG_A | SEG_C | SEG_D | SEG_E | SEG_F | SEG_G,         // 6
  SEG_A | SEG_B | SEG_C,                                 // 7
  SEG_A | SEG_B | SEG_C | SEG_D | SEG_E | SEG_F | SEG_G, // 8
  SEG_A | SEG_B | SEG_C | SEG_D | SEG_F | SEG_G,         // 9
];

/// 渲染一个数字的七段码模板: 黑底白段
fn render_digit(digit: u8) -> GrayImage {
  let mut glyph = GrayImage::new(TEMPLATE_WIDTH, TEMPLATE_HEIGHT);
  let segments = DIGIT_SEGMENTS[digit as usize];

  let w = TEMPLATE_WIDTH as i32;
  let h = TEMPLATE_HEIGHT as i32;
  let m = SEGMENT_MARGIN;
  let t = SEGMENT_THICKNESS;
  let on = Luma([255u8]);

  let horizontal = |y: i32| Rect::at(m + t, y).of_size((w - 2 * m - 2 * t) as u32, t as u32);
  let vertical = |x: i32, y: i32| Rect::at(x, y).of_size(t as u32, (h / 2 - m) as u32);

  if segments & SEG_A != 0 {
    draw_filled_rect_mut(&mut glyph, horizontal(m), on);
  }
  if segments & SEG_D != 0 {
    draw_filled_rect_mut(&mut glyph, horizontal(h - m - t), on);
  }
  if segments & SEG_G != 0 {
    draw_filled_rect_mut(&mut glyph, horizontal(h / 2 - t / 2), on);
  }
  if segments & SEG_F != 0 {
    draw_filled_rect_mut(&mut glyph, vertical(m, m), on);
  }
  if segments & SEG_B != 0 {
    draw_filled_rect_mut(&mut glyph, vertical(w - m - t, m), on);
  }
  if segments & SEG_E != 0 {
    draw_filled_rect_mut(&mut glyph, vertical(m, h / 2), on);
  }
  if segments & SEG_C != 0 {
    draw_filled_rect_mut(&mut glyph, vertical(w - m - t, h / 2), on);
  }

  glyph
}

/// 七段码模板匹配分类器
///
/// 不依赖外部模型文件: 模板在 `load` 时合成, 以归一化互相关
/// 作为匹配度, 得分最高的模板即预测数字, 得分即置信度。
pub struct TemplateClassifier {
  templates: Vec<GrayImage>,
}

impl TemplateClassifier {
  pub fn new() -> Self {
    Self {
      templates: Vec::new(),
    }
  }

  fn match_score(resized: &GrayImage, template: &GrayImage) -> f32 {
    // 尺寸一致时输出为 1x1 的相关度图
    let scores = match_template(
      resized,
      template,
      MatchTemplateMethod::CrossCorrelationNormalized,
    );
    scores.get_pixel(0, 0)[0]
  }
}

impl Default for TemplateClassifier {
  fn default() -> Self {
    Self::new()
  }
}

impl Classifier for TemplateClassifier {
  fn load(&mut self) -> Result<(), ClassifierError> {
    if !self.templates.is_empty() {
      return Ok(());
    }
    self.templates = (0u8..10).map(render_digit).collect();
    info!("七段码模板已生成: {} 个", self.templates.len());
    Ok(())
  }

  fn predict_batch(&self, cells: &[GrayImage]) -> Result<Vec<Classification>, ClassifierError> {
    if self.templates.is_empty() {
      return Err(ClassifierError::ModelNotLoaded);
    }

    let mut results = Vec::with_capacity(cells.len());
    for cell in cells {
      let resized = imageops::resize(
        cell,
        TEMPLATE_WIDTH,
        TEMPLATE_HEIGHT,
        imageops::FilterType::Triangle,
      );
      let mut best: Option<(u8, f32)> = None;
      for (digit, template) in self.templates.iter().enumerate() {
        let score = Self::match_score(&resized, template);
        // 全黑单元的归一化相关度没有定义
        if !score.is_finite() {
          continue;
        }
        if best.map_or(true, |(_, s)| score > s) {
          best = Some((digit as u8, score));
        }
      }
      let classification = match best {
        Some((digit, score)) if score > 0.0 => Classification {
          digit: Some(digit),
          confidence: score.clamp(0.0, 1.0),
        },
        _ => Classification::unknown(),
      };
      debug!(
        "模板匹配: {:?} (置信度 {:.3})",
        classification.digit, classification.confidence
      );
      results.push(classification);
    }
    Ok(results)
  }
}
