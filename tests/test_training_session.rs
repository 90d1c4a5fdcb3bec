/*
 * @Date         : 2026-03-13
 * @Description  : 工作台训练会话：后台训练、按轮推送指标、协作式停止与重新编译
 */
use block_graph::data::{
    BatchSource, DataError, DataLoader, DatasetRegistry, Sample, SyntheticDataset, TensorDataset,
};
use block_graph::nn::{
    BlockCatalog, Connection, GraphSnapshot, LossFunction, Node, TrainingConfig, Workbench,
};
use block_graph::tensor::Tensor;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

fn iris_classifier() -> GraphSnapshot {
    GraphSnapshot::new(
        vec![
            Node::new("data", "DataLoader").with_param("dataset", "iris"),
            Node::new("hidden", "Dense")
                .with_param("units", 16)
                .with_param("activation", "tanh"),
            Node::new("drop", "Dropout").with_param("rate", 0.2),
            Node::new("out", "Dense")
                .with_param("units", 3)
                .with_param("activation", "softmax"),
        ],
        vec![
            Connection::new("e1", ("data", "data"), ("hidden", "input")),
            Connection::new("e2", ("hidden", "output"), ("drop", "input")),
            Connection::new("e3", ("drop", "output"), ("out", "input")),
        ],
    )
}

fn workbench() -> Workbench {
    Workbench::new(Arc::new(BlockCatalog::builtin()))
        .with_datasets(Arc::new(DatasetRegistry::builtin()))
}

/// 每次取批次前等待放行信号，便于测试精确控制轮次
struct Gated {
    inner: SyntheticDataset,
    gate: Receiver<()>,
}

impl BatchSource for Gated {
    fn next_batch(&mut self, epoch: usize, batch_size: usize) -> Result<Vec<Sample>, DataError> {
        // 发送端被丢弃后不再阻塞
        let _ = self.gate.recv();
        self.inner.next_batch(epoch, batch_size)
    }
}

#[test]
fn test_stop_after_third_epoch() {
    let mut bench = workbench();
    bench.compile(&iris_classifier()).unwrap();

    let (open, gate) = mpsc::channel();
    let source = Gated {
        inner: SyntheticDataset::from_registry(&DatasetRegistry::builtin(), "iris", 1).unwrap(),
        gate,
    };
    let config = TrainingConfig {
        epochs: 50,
        batch_size: 8,
        learning_rate: 0.01,
        ..TrainingConfig::default()
    };
    let metrics = bench.start_training(config, source).unwrap();

    for epoch in 1..=3 {
        open.send(()).unwrap();
        assert_eq!(metrics.recv().unwrap().epoch, epoch);
    }
    // 第 4 轮的批次请求仍在等待；先发停止信号再放行
    let handle = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(open);
    });
    let history = bench.stop_training().unwrap();
    handle.join().unwrap();

    // 已开始的第 4 轮会完整结束
    assert!(history.len() == 3 || history.len() == 4, "{}", history.len());
    assert!(history.iter().enumerate().all(|(i, m)| m.epoch == i + 1));
    assert!(bench.model().is_some());
}

#[test]
fn test_train_from_tensor_dataset() {
    let mut bench = workbench();
    bench.compile(&iris_classifier()).unwrap();

    // 两类可分的数据：第一维的正负决定类别
    let n = 24;
    let mut features = Vec::with_capacity(n * 4);
    let mut labels = Vec::with_capacity(n * 3);
    for i in 0..n {
        let class = i % 2;
        let sign = if class == 0 { 1.0 } else { -1.0 };
        features.extend_from_slice(&[sign, 0.5 * sign, 0.1, -0.1]);
        labels.extend_from_slice(if class == 0 { &[1.0, 0.0, 0.0] } else { &[0.0, 1.0, 0.0] });
    }
    let dataset = TensorDataset::new(
        Tensor::new(&features, &[n, 4]),
        Tensor::new(&labels, &[n, 3]),
    )
    .unwrap();
    let validation = dataset.clone();
    let loader = DataLoader::new(dataset, 8).shuffle(true).seed(3).validation(validation);

    // 每轮 3 步，恰好覆盖整个数据集
    let config = TrainingConfig {
        epochs: 20,
        batch_size: 8,
        learning_rate: 0.05,
        loss_function: LossFunction::CrossEntropy,
        steps_per_epoch: 3,
        ..TrainingConfig::default()
    };
    let metrics = bench.start_training(config, loader).unwrap();
    let history = bench.wait().unwrap();
    assert_eq!(history.len(), 20);
    // 训练线程结束后发送端关闭，通道可以读尽
    assert_eq!(metrics.iter().count(), 20);

    // 验证批次固定，验证损失可直接比较
    let (first, last) = (&history[0], &history[19]);
    assert!(last.val_loss.unwrap() < first.val_loss.unwrap(), "{history:?}");
    assert!(last.val_accuracy.unwrap() >= 0.75, "{last:?}");
}

#[test]
fn test_recompile_replaces_model() {
    let mut bench = workbench();
    let first = bench.compile(&iris_classifier()).unwrap().total_params;
    assert_eq!(first, (4 * 16 + 16) + (16 * 3 + 3));

    let mut bigger = iris_classifier();
    bigger
        .set_param(bench.catalog(), "hidden", "units", 32)
        .unwrap();
    let second = bench.compile(&bigger).unwrap().total_params;
    assert_eq!(second, (4 * 32 + 32) + (32 * 3 + 3));
}
