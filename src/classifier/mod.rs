// 该文件是 Dushu （读数） 项目的一部分。
// src/classifier/mod.rs - 数字分类器能力接口
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

mod cnn;
mod template;

pub use cnn::CnnClassifier;
pub use template::TemplateClassifier;

use std::path::{Path, PathBuf};

use image::GrayImage;
use thiserror::Error;

/// 单个数字单元的分类结果
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
  /// 识别出的数字(0-9); 无法识别时为 None
  pub digit: Option<u8>,
  /// 置信度(0.0 - 1.0)
  pub confidence: f32,
}

impl Classification {
  /// 无法识别的结果
  pub fn unknown() -> Self {
    Self {
      digit: None,
      confidence: 0.0,
    }
  }
}

/// 分类器后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
  /// 七段码模板匹配
  Template,
  /// 预训练 CNN 模型
  Cnn,
}

#[derive(Error, Debug)]
pub enum ClassifierError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("模型尚未加载, 必须先成功调用 load()")]
  ModelNotLoaded,
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("推理失败: {0}")]
  Inference(String),
  #[error("CNN 后端需要指定模型文件路径")]
  ModelPathMissing,
}

/// 数字分类器的统一能力接口
///
/// 两个后端可以互换: `load` 幂等, 且必须在 `predict_batch` 之前成功;
/// `predict_batch` 的输出与输入一一对应, 长度与顺序一致。
pub trait Classifier: Send {
  /// 加载分类器所需的模型/模板
  fn load(&mut self) -> Result<(), ClassifierError>;

  /// 对一批预处理过的数字单元图像分类
  fn predict_batch(&self, cells: &[GrayImage]) -> Result<Vec<Classification>, ClassifierError>;
}

/// 按配置创建分类器后端
pub fn create_classifier(
  kind: ClassifierKind,
  model_path: Option<&Path>,
) -> Result<Box<dyn Classifier>, ClassifierError> {
  match kind {
    ClassifierKind::Template => Ok(Box::new(TemplateClassifier::new())),
    ClassifierKind::Cnn => {
      let path = model_path.ok_or(ClassifierError::ModelPathMissing)?;
      Ok(Box::new(CnnClassifier::new(path)?))
    }
  }
}
