//! # 批量执行器
//!
//! 并行执行多个独立的计算任务。
//!
//! ## 功能
//! - 基于 rayon 的并行迭代，每个文件一个任务
//! - 进度条显示
//! - 错误收集与汇总报告
//!
//! ## 依赖关系
//! - 被 `commands/eos.rs` 调用
//! - 使用 `utils/progress.rs` 创建进度条
//! - 使用 `rayon` 进行并行计算

use crate::error::{QeosError, Result};
use crate::utils::progress;

use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// 单个文件处理结果
#[derive(Debug, Clone)]
pub enum ProcessResult<T> {
    /// 处理成功
    Success(PathBuf, T),
    /// 跳过（如输出已存在）
    Skipped(PathBuf, String),
    /// 处理失败
    Failed(PathBuf, String),
}

/// 批量处理结果
#[derive(Debug)]
pub struct BatchResult<T> {
    pub successes: Vec<(PathBuf, T)>,
    pub skipped: Vec<(PathBuf, String)>,
    pub failures: Vec<(PathBuf, String)>,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        BatchResult {
            successes: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> BatchResult<T> {
    /// 合并处理结果
    pub fn merge(&mut self, result: ProcessResult<T>) {
        match result {
            ProcessResult::Success(path, value) => self.successes.push((path, value)),
            ProcessResult::Skipped(path, reason) => self.skipped.push((path, reason)),
            ProcessResult::Failed(path, err) => self.failures.push((path, err)),
        }
    }

    /// 总处理数量
    pub fn total(&self) -> usize {
        self.successes.len() + self.skipped.len() + self.failures.len()
    }
}

/// 批量执行器
pub struct BatchRunner {
    /// 并行作业数
    jobs: usize,
}

impl BatchRunner {
    /// `jobs` 为 0 时使用全部 CPU
    pub fn new(jobs: usize) -> Self {
        let jobs = if jobs == 0 { num_cpus::get() } else { jobs };
        Self { jobs }
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// 并行处理文件列表，结果保持输入顺序
    pub fn run<T, F>(&self, files: &[PathBuf], processor: F) -> Result<BatchResult<T>>
    where
        T: Send,
        F: Fn(&Path) -> ProcessResult<T> + Sync + Send,
    {
        let pb = progress::create_progress_bar(files.len() as u64, "Processing");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| QeosError::Other(format!("Failed to build thread pool: {}", e)))?;

        let results: Vec<ProcessResult<T>> = pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    let result = processor(file);
                    pb.inc(1);
                    result
                })
                .collect()
        });

        pb.finish_and_clear();

        let mut batch_result = BatchResult::default();
        for result in results {
            batch_result.merge(result);
        }
        Ok(batch_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_keep_order() {
        let files: Vec<PathBuf> = (0..20).map(|i| PathBuf::from(format!("{}.cif", i))).collect();
        let result = BatchRunner::new(4)
            .run(&files, |path| {
                let stem: usize = path.file_stem().unwrap().to_str().unwrap().parse().unwrap();
                match stem % 5 {
                    0 => ProcessResult::Failed(path.to_path_buf(), "bad".to_string()),
                    1 => ProcessResult::Skipped(path.to_path_buf(), "exists".to_string()),
                    _ => ProcessResult::Success(path.to_path_buf(), stem * 2),
                }
            })
            .unwrap();

        assert_eq!(result.total(), 20);
        assert_eq!(result.failures.len(), 4);
        assert_eq!(result.skipped.len(), 4);
        assert_eq!(result.successes[0], (PathBuf::from("2.cif"), 4));
    }
}
