// 该文件是 Kanlian （看脸） 项目的一部分。
// src/task.rs - 任务执行
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


use std::{
  sync::mpsc,
  thread,
  time::{Duration, Instant},
};
use tracing::{info, warn};

use crate::{
  model::{DetectResult, Model},
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 一次任务中的检测统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DetectionTally {
  pub frames: usize,
  pub frames_with_faces: usize,
  pub faces: usize,
}

impl DetectionTally {
  fn record(&mut self, result: &DetectResult) {
    self.frames += 1;
    self.faces += result.len();
    if !result.is_empty() {
      self.frames_with_faces += 1;
    }
  }

  fn report(&self) {
    info!(
      "共处理 {} 帧, 其中 {} 帧有人脸, 人脸总数 {}",
      self.frames, self.frames_with_faces, self.faces
    );
  }
}

fn log_detection(frame_index: usize, result: &DetectResult, elapsed: Duration) {
  match result.top_score() {
    Some(score) => info!(
      "第 {} 帧检测到 {} 张人脸, 最高分 {:.3}, 耗时 {:.2?}",
      frame_index,
      result.len(),
      score,
      elapsed
    ),
    None => info!("第 {} 帧未检测到人脸, 耗时 {:.2?}", frame_index, elapsed),
  }
}

/// 只检测第一帧
pub struct OneShotTask;

impl<
  F,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = DetectResult, Error = ME>,
  O: Render<F, DetectResult, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    let now = Instant::now();
    let result = model.infer(&frame)?;
    log_detection(0, &result, now.elapsed());
    output.render_result(&frame, &result)?;
    Ok(())
  }
}

const DEFAULT_REPEAT_TIMES: usize = 1000;
// 前几轮包含缓存预热，不计入平均
const WARMUP_ROUNDS: usize = 2;

/// 对同一帧反复检测，统计平均耗时
#[derive(Debug)]
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat: DEFAULT_REPEAT_TIMES,
    }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }
}

impl<
  F,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = DetectResult, Error = ME>,
  O: Render<F, DetectResult, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("重复检测 {} 次", self.repeat);

    let mut times = Vec::with_capacity(self.repeat);
    let mut face_counts = Vec::with_capacity(self.repeat);
    for _ in 0..self.repeat {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      times.push(now.elapsed());
      face_counts.push(result.len());
      output.render_result(&frame, &result)?;
    }

    // 同一帧的人脸数应当每轮一致
    if face_counts.windows(2).any(|pair| pair[0] != pair[1]) {
      warn!("各轮人脸数不一致: {:?}", face_counts);
    }

    let skip = if times.len() > WARMUP_ROUNDS { WARMUP_ROUNDS } else { 0 };
    let counted = (times.len() - skip) as u32;
    warn!(
      "每轮 {} 张人脸, 平均检测时间: {:.2?}",
      face_counts.first().copied().unwrap_or_default(),
      times.iter().skip(skip).sum::<Duration>() / counted
    );

    Ok(())
  }
}

/// 持续处理输入帧，直到输入耗尽、达到帧数或收到 Ctrl-C
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  fn run_frames<F, I, M, O>(
    &self,
    input: I,
    model: &M,
    output: &O,
    interrupted: impl Fn() -> bool,
  ) -> anyhow::Result<DetectionTally>
  where
    I: Iterator<Item = F>,
    M: Model<Input = F, Output = DetectResult>,
    M::Error: std::error::Error + Sync + Send + 'static,
    O: Render<F, DetectResult>,
    O::Error: std::error::Error + Sync + Send + 'static,
  {
    let mut tally = DetectionTally::default();
    for frame in input {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      log_detection(tally.frames, &result, now.elapsed());
      output.render_result(&frame, &result)?;
      tally.record(&result);

      if self.frame_number.is_some_and(|n| tally.frames >= n) {
        info!("达到指定帧数 {}", tally.frames);
        break;
      }
      if interrupted() {
        warn!("收到中断信号，停止处理");
        break;
      }
    }
    Ok(tally)
  }
}

impl<
  F,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = DetectResult, Error = ME>,
  O: Render<F, DetectResult, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    let tally = self.run_frames(input, &model, &output, || rx.try_recv().is_ok())?;
    tally.report();
    Ok(())
  }
}
