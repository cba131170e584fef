// 该文件是 Dushu （读数） 项目的一部分。
// src/aggregate.rs - 多帧投票与读数合成
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

use serde::Serialize;

use crate::classifier::Classification;

/// 一次采样的最终输出
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Sample {
  /// 合成读数; 任何一位识别失败时为 None
  pub reading: Option<u64>,
  /// 识别失败的位数占比(0.0 - 1.0)
  pub failed_rate: f32,
  /// 采样时刻, 形如 "0:00:03"
  pub timestamp: String,
}

impl Sample {
  /// 区域提取失败等情况下的整体失败样本
  pub fn failed(timestamp: String) -> Self {
    Self {
      reading: None,
      failed_rate: 1.0,
      timestamp,
    }
  }
}

/// 对同一采样窗口内多帧的分类结果按位投票。
///
/// 每一位取多数票数字, 该位置信度为同意多数票的帧数占比;
/// 窗口只有单帧时直接沿用分类器给出的置信度。
pub fn vote(frames: &[Vec<Classification>]) -> Vec<Classification> {
  let Some(first) = frames.first() else {
    return Vec::new();
  };
  if frames.len() == 1 {
    return first.clone();
  }

  let num_digits = first.len();
  let mut voted = Vec::with_capacity(num_digits);
  for position in 0..num_digits {
    // 下标 0-9 计数字票数, 下标 10 计未识别票数
    let mut ballots = [0usize; 11];
    for frame in frames {
      match frame.get(position).and_then(|c| c.digit) {
        Some(digit) => ballots[digit as usize] += 1,
        None => ballots[10] += 1,
      }
    }
    let (winner, count) = ballots
      .iter()
      .enumerate()
      .max_by_key(|(_, count)| **count)
      .unwrap();
    let confidence = *count as f32 / frames.len() as f32;
    voted.push(Classification {
      digit: if winner == 10 { None } else { Some(winner as u8) },
      confidence,
    });
  }
  voted
}

/// 把 N 位分类结果按位权合成为一个样本。
///
/// 置信度低于接受阈值或无法识别的位计为失败位;
/// 只要有失败位, 整个样本的读数就置空, 而不是给出半截数字。
pub fn aggregate(digits: &[Classification], accept_threshold: f32, timestamp: String) -> Sample {
  let mut failed = 0usize;
  let mut value = 0u64;
  for classification in digits {
    match classification.digit {
      Some(digit) if classification.confidence >= accept_threshold => {
        value = value * 10 + digit as u64;
      }
      _ => failed += 1,
    }
  }

  if digits.is_empty() {
    return Sample::failed(timestamp);
  }

  Sample {
    reading: if failed == 0 { Some(value) } else { None },
    failed_rate: failed as f32 / digits.len() as f32,
    timestamp,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sure(digit: u8) -> Classification {
    Classification {
      digit: Some(digit),
      confidence: 1.0,
    }
  }

  fn shaky(digit: u8, confidence: f32) -> Classification {
    Classification {
      digit: Some(digit),
      confidence,
    }
  }

  #[test]
  fn combines_digits_by_place_value() {
    let digits = vec![sure(1), sure(2), sure(3), sure(4)];
    let sample = aggregate(&digits, 0.6, "0:00:00".into());
    assert_eq!(sample.reading, Some(1234));
    assert_eq!(sample.failed_rate, 0.0);
  }

  #[test]
  fn low_confidence_digit_nulls_the_reading() {
    let digits = vec![sure(1), shaky(2, 0.3), sure(3), sure(4)];
    let sample = aggregate(&digits, 0.6, "0:00:03".into());
    assert_eq!(sample.reading, None);
    assert_eq!(sample.failed_rate, 0.25);
  }

  #[test]
  fn unknown_digit_counts_as_failed() {
    let digits = vec![sure(9), Classification::unknown(), sure(0), sure(7)];
    let sample = aggregate(&digits, 0.6, "0:00:06".into());
    assert_eq!(sample.reading, None);
    assert_eq!(sample.failed_rate, 0.25);
  }

  #[test]
  fn leading_zero_keeps_place_value() {
    let digits = vec![sure(0), sure(0), sure(4), sure(2)];
    let sample = aggregate(&digits, 0.6, "0:00:00".into());
    assert_eq!(sample.reading, Some(42));
  }

  #[test]
  fn vote_takes_majority_per_position() {
    let frames = vec![
      vec![sure(1), sure(2)],
      vec![sure(1), sure(5)],
      vec![sure(7), sure(2)],
    ];
    let voted = vote(&frames);
    assert_eq!(voted[0].digit, Some(1));
    assert!((voted[0].confidence - 2.0 / 3.0).abs() < 1e-6);
    assert_eq!(voted[1].digit, Some(2));
    assert!((voted[1].confidence - 2.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn unanimous_vote_has_full_confidence() {
    let frames = vec![vec![sure(8)]; 10];
    let voted = vote(&frames);
    assert_eq!(voted, vec![sure(8)]);
  }

  #[test]
  fn single_frame_window_keeps_classifier_confidence() {
    let frames = vec![vec![shaky(3, 0.42)]];
    let voted = vote(&frames);
    assert_eq!(voted, vec![shaky(3, 0.42)]);
  }

  #[test]
  fn majority_of_unknowns_stays_unknown() {
    let frames = vec![
      vec![Classification::unknown()],
      vec![Classification::unknown()],
      vec![sure(5)],
    ];
    let voted = vote(&frames);
    assert_eq!(voted[0].digit, None);
  }

  #[test]
  fn empty_input_is_a_failed_sample() {
    let sample = aggregate(&[], 0.6, "0:00:00".into());
    assert_eq!(sample.reading, None);
    assert_eq!(sample.failed_rate, 1.0);
  }
}
