// 该文件是 Dushu （读数） 项目的一部分。
// src/classifier/cnn.rs - 预训练 CNN 分类器(ONNX)
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

use image::{GrayImage, imageops};
use tract_onnx::prelude::*;
use tracing::{debug, info};

use super::{Classification, Classifier, ClassifierError};

/// 模型输入尺寸(单通道灰度)
const INPUT_WIDTH: u32 = 100;
const INPUT_HEIGHT: u32 = 100;
/// 输出类别数(数字 0-9)
const NUM_CLASSES: usize = 10;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// 预训练 CNN 分类器
///
/// 从 ONNX 模型文件加载; 模型末层为 softmax, 最高概率的类别
/// 即预测数字, 该概率即置信度。
pub struct CnnClassifier {
  model_path: PathBuf,
  plan: Option<OnnxPlan>,
}

impl CnnClassifier {
  /// 创建 CNN 分类器。
  ///
  /// 模型文件缺失在这里立即报告, 调用方可以在处理任何帧之前
  /// 对这一可恢复条件作出反应。
  pub fn new(model_path: &Path) -> Result<Self, ClassifierError> {
    if !model_path.exists() {
      return Err(ClassifierError::ModelNotFound(model_path.to_path_buf()));
    }
    Ok(Self {
      model_path: model_path.to_path_buf(),
      plan: None,
    })
  }

  fn preprocess(cell: &GrayImage) -> Tensor {
    let resized = imageops::resize(
      cell,
      INPUT_WIDTH,
      INPUT_HEIGHT,
      imageops::FilterType::Triangle,
    );
    tract_ndarray::Array4::from_shape_fn(
      (1, 1, INPUT_HEIGHT as usize, INPUT_WIDTH as usize),
      |(_, _, y, x)| resized.get_pixel(x as u32, y as u32)[0] as f32 / 255.0,
    )
    .into()
  }
}

impl Classifier for CnnClassifier {
  fn load(&mut self) -> Result<(), ClassifierError> {
    if self.plan.is_some() {
      return Ok(());
    }

    info!("加载模型文件: {}", self.model_path.display());
    let plan = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .map_err(|e| ClassifierError::ModelInvalid(e.to_string()))?
      .with_input_fact(
        0,
        f32::fact([1, 1, INPUT_HEIGHT as usize, INPUT_WIDTH as usize]).into(),
      )
      .map_err(|e| ClassifierError::ModelInvalid(e.to_string()))?
      .into_optimized()
      .map_err(|e| ClassifierError::ModelInvalid(e.to_string()))?
      .into_runnable()
      .map_err(|e| ClassifierError::ModelInvalid(e.to_string()))?;

    // 校验输出形状是否与 10 类数字一致
    let fact = plan
      .model()
      .output_fact(0)
      .map_err(|e| ClassifierError::ModelInvalid(e.to_string()))?;
    if let Some(shape) = fact.shape.as_concrete() {
      let classes: usize = shape.iter().product();
      if classes != NUM_CLASSES {
        return Err(ClassifierError::ModelInvalid(format!(
          "预期输出 {} 类, 实际为 {}",
          NUM_CLASSES, classes
        )));
      }
      debug!("模型输出形状: {:?}", shape);
    }

    self.plan = Some(plan);
    info!("模型加载完成");
    Ok(())
  }

  fn predict_batch(&self, cells: &[GrayImage]) -> Result<Vec<Classification>, ClassifierError> {
    let plan = self.plan.as_ref().ok_or(ClassifierError::ModelNotLoaded)?;

    let mut results = Vec::with_capacity(cells.len());
    for cell in cells {
      let input = Self::preprocess(cell);
      let output = plan
        .run(tvec!(input.into()))
        .map_err(|e| ClassifierError::Inference(e.to_string()))?;
      let probabilities = output[0]
        .to_array_view::<f32>()
        .map_err(|e| ClassifierError::Inference(e.to_string()))?;

      let mut best: Option<(u8, f32)> = None;
      for (digit, &probability) in probabilities.iter().enumerate() {
        if best.map_or(true, |(_, p)| probability > p) {
          best = Some((digit as u8, probability));
        }
      }
      results.push(match best {
        Some((digit, probability)) if probability.is_finite() => Classification {
          digit: Some(digit),
          confidence: probability.clamp(0.0, 1.0),
        },
        _ => Classification::unknown(),
      });
    }
    Ok(results)
  }
}
