/*
 * @Date         : 2026-03-12
 * @Description  : 工作台：校验/编译/训练的单会话门面
 *
 * 同一时刻至多一个模型处于训练中：
 * - `compile` 与 `start_training` 都会先停止正在进行的训练
 * - 训练期间模型移交给后台线程独占，训练结束（`stop_training`/`wait`）后归还；
 *   训练线程 panic 时模型丢失，须重新编译
 * - 每轮指标经由通道按顺序推送给调用方
 */

use super::catalog::BlockCatalog;
use super::compiler::{DEFAULT_SEED, ModelCompiler};
use super::graph::{ConnectionIssue, GraphSnapshot, GraphValidator};
use super::model::CompiledModel;
use super::trainer::{StopHandle, Trainer, TrainingConfig, TrainingMetrics};
use crate::data::{BatchSource, DatasetProvider};
use crate::errors::{CompileError, TrainError};
use log::{info, warn};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

type RunResult = (CompiledModel, Result<Vec<TrainingMetrics>, TrainError>);

/// 后台训练会话
struct ActiveRun {
    stop: StopHandle,
    handle: JoinHandle<RunResult>,
}

pub struct Workbench {
    catalog: Arc<BlockCatalog>,
    datasets: Option<Arc<dyn DatasetProvider>>,
    model: Option<CompiledModel>,
    run: Option<ActiveRun>,
    seed: u64,
}

impl Workbench {
    pub fn new(catalog: Arc<BlockCatalog>) -> Self {
        Self {
            catalog,
            datasets: None,
            model: None,
            run: None,
            seed: DEFAULT_SEED,
        }
    }

    /// 注入数据集提供者（训练的前提）
    pub fn with_datasets(mut self, datasets: Arc<dyn DatasetProvider>) -> Self {
        self.datasets = Some(datasets);
        self
    }

    /// 权重初始化种子
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn catalog(&self) -> &BlockCatalog {
        &self.catalog
    }

    /// 当前持有的已编译模型（训练期间为 `None`）
    pub fn model(&self) -> Option<&CompiledModel> {
        self.model.as_ref()
    }

    pub fn is_training(&self) -> bool {
        self.run.is_some()
    }

    pub fn validate(&self, snapshot: &GraphSnapshot) -> Vec<ConnectionIssue> {
        GraphValidator::new(&self.catalog).validate_graph(snapshot)
    }

    /// 编译并替换当前模型（会先停止正在进行的训练）
    pub fn compile(&mut self, snapshot: &GraphSnapshot) -> Result<&CompiledModel, CompileError> {
        if let Err(e) = self.stop_training() {
            warn!("停止上一次训练时出错：{e}");
        }
        let mut compiler = ModelCompiler::new(&self.catalog).seed(self.seed);
        if let Some(datasets) = &self.datasets {
            compiler = compiler.with_datasets(datasets.as_ref());
        }
        let model = compiler.compile(snapshot)?;
        Ok(self.model.insert(model))
    }

    /// 在后台线程开始训练，返回按轮推送的指标通道
    ///
    /// 会先停止正在进行的训练；需要已注入数据集提供者并已编译模型
    pub fn start_training<S>(
        &mut self,
        config: TrainingConfig,
        mut source: S,
    ) -> Result<Receiver<TrainingMetrics>, TrainError>
    where
        S: BatchSource + Send + 'static,
    {
        if let Err(e) = self.stop_training() {
            warn!("停止上一次训练时出错：{e}");
        }
        if self.datasets.is_none() {
            return Err(TrainError::RuntimeNotInitialized);
        }
        config.validate()?;
        let mut model = self.model.take().ok_or(TrainError::ModelNotReady)?;

        let trainer = Trainer::new();
        let stop = trainer.stop_handle();
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let result = trainer.train_model(
                &mut model,
                &config,
                &mut source,
                // 接收方被丢弃后继续训练，只是不再推送
                |metrics| {
                    let _ = tx.send(metrics.clone());
                },
                |history| info!("训练结束，共 {} 轮", history.len()),
            );
            (model, result)
        });
        self.run = Some(ActiveRun { stop, handle });
        Ok(rx)
    }

    /// 请求停止并等待当前轮结束，归还模型；没有训练时返回空历史
    pub fn stop_training(&mut self) -> Result<Vec<TrainingMetrics>, TrainError> {
        if let Some(run) = &self.run {
            run.stop.stop();
        }
        self.wait()
    }

    /// 等待训练自然结束，归还模型
    ///
    /// 训练线程 panic 时模型随线程一起丢失，返回 `WorkerPanicked`，须重新 `compile`
    pub fn wait(&mut self) -> Result<Vec<TrainingMetrics>, TrainError> {
        let Some(run) = self.run.take() else {
            return Ok(Vec::new());
        };
        let (model, result) = run.handle.join().map_err(|_| {
            warn!("训练线程异常退出，已编译的模型丢失，需要重新编译");
            TrainError::WorkerPanicked
        })?;
        self.model = Some(model);
        result
    }
}

impl Drop for Workbench {
    fn drop(&mut self) {
        if self.run.is_some() {
            let _ = self.stop_training();
        }
    }
}
